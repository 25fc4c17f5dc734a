//! `play`: one game, round by round

use anyhow::Result;
use dilemma_logic::{Game, GameRecord, RoundResult, Side};
use tracing::info;

use super::strategy_factory;
use crate::cli::PlayArgs;
use crate::config::LabConfig;
use crate::storage::JsonGameHistory;

pub async fn run(config: &LabConfig, args: PlayArgs) -> Result<()> {
    let matrix = args.matrix.matrix();
    let needs_ai = args.player1.is_ai() || args.player2.is_ai();
    let factory = strategy_factory(config, matrix.clone(), args.seed, needs_ai)?;
    let rounds = args.rounds.unwrap_or(config.experiment.num_rounds);

    let mut game = Game::new(
        factory.build(args.player1, Side::One)?,
        factory.build(args.player2, Side::Two)?,
        rounds,
        Some(matrix),
    )?;
    info!(
        "Game {}: {} vs {} on {}",
        game.id(),
        game.player1().name(),
        game.player2().name(),
        args.matrix
    );

    if !args.json {
        println!(
            "{} vs {} ({} rounds, {} matrix)",
            game.player1().name(),
            game.player2().name(),
            rounds,
            args.matrix
        );
        println!();
    }

    while !game.is_game_over() {
        let round = game.process_round().await?;
        if !args.json {
            for line in round_lines(&round) {
                println!("{}", line);
            }
        }
    }

    let record = game.record()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_summary(&record);
    }

    if args.save {
        let history = JsonGameHistory::new(config.storage.history_path());
        history.save_game(&record)?;
        if !args.json {
            println!("Saved {} to {}", record.game_id, history.path().display());
        }
    }

    Ok(())
}

/// Score line for a round, plus model reasoning and errors when present
pub fn round_lines(round: &RoundResult) -> Vec<String> {
    let mut lines = vec![format!(
        "Round {:>3}: {:<9} vs {:<9} | {:>5} - {:<5} | total {} - {}",
        round.round_number,
        round.player1_move.as_str(),
        round.player2_move.as_str(),
        round.player1_score,
        round.player2_score,
        round.cumulative_player1_score,
        round.cumulative_player2_score
    )];

    if let Some(meta) = &round.ai_metadata {
        for side in [Side::One, Side::Two] {
            let reasoning = round.reasoning_of(side);
            if !reasoning.is_empty() {
                lines.push(format!("    {}: {}", side, reasoning));
            }
        }
        if let Some(error) = &meta.api_error {
            lines.push(format!("    api error: {}", error));
        }
    }
    lines
}

fn print_summary(record: &GameRecord) {
    let (p1, p2) = record.final_scores;
    println!();
    println!(
        "Final score: {} {} - {} {}",
        record.player1_strategy, p1, p2, record.player2_strategy
    );

    let verdict = if p1 > p2 {
        format!("{} wins", record.player1_strategy)
    } else if p2 > p1 {
        format!("{} wins", record.player2_strategy)
    } else {
        "Draw".to_string()
    };
    println!("{}", verdict);

    for summary in &record.ai_summaries {
        println!(
            "{} ({}) used {} tokens over {} decisions",
            summary.side,
            summary.model,
            summary.total_tokens,
            summary.transcript.len()
        );
    }
}
