//! `strategies` and `matrices`

use anyhow::Result;
use dilemma_logic::{MatrixType, PayoffMatrix, StrategyKind};

pub fn strategies() -> Result<()> {
    println!("{:<18} {:<18} DESCRIPTION", "ID", "NAME");
    for kind in StrategyKind::all() {
        println!(
            "{:<18} {:<18} {}",
            kind.as_str(),
            kind.display_name(),
            kind.description()
        );
    }
    Ok(())
}

pub fn matrices() -> Result<()> {
    for (i, matrix_type) in MatrixType::all().iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}: {}", matrix_type, matrix_type.description());
        for line in matrix_lines(&matrix_type.matrix()) {
            println!("  {}", line);
        }
    }
    Ok(())
}

/// Cells as `(own, opponent)` rows, followed by the optimal annotation
pub fn matrix_lines(matrix: &PayoffMatrix) -> Vec<String> {
    let mut lines: Vec<String> = matrix
        .entries()
        .iter()
        .map(|entry| {
            format!(
                "{:<9} / {:<9} -> {} / {}",
                entry.own.as_str(),
                entry.opponent.as_str(),
                entry.payoffs.0,
                entry.payoffs.1
            )
        })
        .collect();

    if let Some(optimal) = matrix.optimal() {
        let (p1, p2) = optimal.expected_score_per_round;
        lines.push(format!(
            "optimal: cooperate {:.0}% of rounds, expected {} / {} per round",
            optimal.cooperation_rate * 100.0,
            p1,
            p2
        ));
    }
    lines
}
