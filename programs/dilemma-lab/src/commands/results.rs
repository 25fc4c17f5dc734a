//! `experiments` and `show`

use anyhow::{bail, Result};
use dilemma_logic::StorageError;

use super::experiment::report_lines;
use crate::config::LabConfig;
use crate::storage::{ExperimentSummary, JsonExperimentStore, JsonGameHistory};

pub fn list(config: &LabConfig) -> Result<()> {
    let store = JsonExperimentStore::new(&config.storage.data_dir);
    let summaries = store.summaries()?;
    if summaries.is_empty() {
        println!("No experiments in {}", store.dir().display());
        return Ok(());
    }

    for line in summary_lines(&summaries) {
        println!("{}", line);
    }
    Ok(())
}

/// Header plus one row per summary, columns wide enough for generated ids
pub fn summary_lines(summaries: &[ExperimentSummary]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<20} {:<12} {:<16} {:>6} {:>8} {:>9}",
        "ID", "MATRIX", "SUBJECT", "GAMES", "COOP", "LEARNING"
    )];
    for summary in summaries {
        lines.push(format!(
            "{:<20} {:<12} {:<16} {:>6} {:>8.3} {:>+9.3}",
            summary.experiment_id,
            summary.matrix_type.as_str(),
            summary.player1_strategy.as_str(),
            summary.total_games,
            summary.cooperation_rate,
            summary.learning_rate
        ));
    }
    lines
}

/// Experiments are looked up first, then the game history
pub fn show(config: &LabConfig, id: &str) -> Result<()> {
    let store = JsonExperimentStore::new(&config.storage.data_dir);
    match store.load_experiment(id) {
        Ok(result) => {
            println!(
                "Experiment {} ({} to {})",
                result.experiment_id, result.start_time, result.end_time
            );
            println!(
                "Subject {} on {}, {} rounds per game",
                result.player1_strategy, result.matrix_type, result.config.num_rounds
            );
            for line in report_lines(&result) {
                println!("{}", line);
            }
            return Ok(());
        }
        Err(StorageError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let history = JsonGameHistory::new(config.storage.history_path());
    match history.get_game(id)? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => bail!("No experiment or saved game with id {}", id),
    }
}
