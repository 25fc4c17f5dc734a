//! `experiment`: the subject against each opponent, many games apiece

use std::sync::Arc;

use anyhow::Result;
use dilemma_logic::{ExperimentConfig, ExperimentResult, ExperimentRunner, StrategyKind};
use tracing::info;

use super::strategy_factory;
use crate::cli::ExperimentArgs;
use crate::config::{ExperimentDefaults, LabConfig};
use crate::storage::JsonExperimentStore;

pub async fn run(config: &LabConfig, args: ExperimentArgs) -> Result<()> {
    let seed = args.seed;
    let experiment = experiment_config(&config.experiment, args);
    let needs_ai = experiment.subject.is_ai()
        || experiment.strategies_to_test.iter().any(StrategyKind::is_ai);

    let factory = strategy_factory(config, experiment.matrix_type.matrix(), seed, needs_ai)?;
    let store = Arc::new(JsonExperimentStore::new(&config.storage.data_dir));

    let total = experiment.num_games;
    let runner = ExperimentRunner::new(experiment, factory, store.clone()).with_progress(
        move |opponent: StrategyKind, game_number: u32, _round: u32| {
            info!("Strategy: {} Game: {}/{}", opponent, game_number, total);
        },
    );

    println!(
        "Experiment {}: {} vs {:?} on {}",
        runner.experiment_id(),
        runner.config().subject,
        runner
            .config()
            .strategies_to_test
            .iter()
            .map(StrategyKind::as_str)
            .collect::<Vec<_>>(),
        runner.config().matrix_type
    );

    let result = runner.run_full_experiment().await?;
    for line in report_lines(&result) {
        println!("{}", line);
    }
    println!("Saved to {}", store.dir().display());

    Ok(())
}

/// Merge command-line overrides onto the configured defaults
pub fn experiment_config(defaults: &ExperimentDefaults, args: ExperimentArgs) -> ExperimentConfig {
    let mut experiment = ExperimentConfig::new(args.matrix);
    experiment.num_games = args.games.unwrap_or(defaults.num_games);
    experiment.num_rounds = args.rounds.unwrap_or(defaults.num_rounds);
    experiment.subject = args.subject;
    experiment.max_concurrent_games = args
        .concurrency
        .unwrap_or(defaults.max_concurrent_games)
        .max(1);
    if !args.opponents.is_empty() {
        experiment.strategies_to_test = args.opponents;
    }
    experiment
}

/// Per-opponent averages followed by the experiment metrics
pub fn report_lines(result: &ExperimentResult) -> Vec<String> {
    let mut lines = vec![String::new()];

    for opponent in &result.opponents {
        let games: Vec<_> = result
            .games
            .iter()
            .filter(|g| g.opponent == *opponent)
            .collect();
        if games.is_empty() {
            continue;
        }
        let n = games.len() as f64;
        let subject_avg = games.iter().map(|g| g.final_scores.0).sum::<f64>() / n;
        let opponent_avg = games.iter().map(|g| g.final_scores.1).sum::<f64>() / n;
        let cooperation = games.iter().map(|g| g.cooperation_rate).sum::<f64>() / n;
        lines.push(format!(
            "vs {:<16} avg score {:.2} - {:.2}, cooperation {:.1}%",
            opponent.as_str(),
            subject_avg,
            opponent_avg,
            cooperation * 100.0
        ));
    }

    let metrics = &result.metrics;
    lines.push(String::new());
    lines.push(format!("Games:            {}", result.games.len()));
    lines.push(format!("Rounds:           {}", metrics.total_rounds));
    lines.push(format!("Cooperation rate: {:.3}", metrics.cooperation_rate));
    lines.push(format!("Average score:    {:.2}", metrics.avg_score));
    lines.push(format!("Learning rate:    {:+.3}", metrics.learning_rate));
    match metrics.points_below_optimal {
        Some(gap) => lines.push(format!("Below optimal:    {:.3} points/round", gap)),
        None => lines.push("Below optimal:    n/a".to_string()),
    }
    lines
}
