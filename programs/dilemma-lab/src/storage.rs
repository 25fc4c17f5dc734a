//! JSON file storage for experiments and played games
//!
//! Experiments go to `<data_dir>/experiments/<id>.json`, with one summary
//! line per experiment appended to `<data_dir>/experiments/summary.jsonl`.
//! Single games played from the CLI are kept in one history document.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dilemma_logic::{
    ExperimentResult, ExperimentStore, GameRecord, MatrixType, StorageError, StrategyKind,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const SUMMARY_FILE: &str = "summary.jsonl";

/// One line of `summary.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub experiment_id: String,
    pub matrix_type: MatrixType,
    pub player1_strategy: StrategyKind,
    pub opponents: Vec<StrategyKind>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_games: usize,
    pub cooperation_rate: f64,
    pub points_below_optimal: Option<f64>,
    pub learning_rate: f64,
}

impl From<&ExperimentResult> for ExperimentSummary {
    fn from(result: &ExperimentResult) -> Self {
        Self {
            experiment_id: result.experiment_id.clone(),
            matrix_type: result.matrix_type,
            player1_strategy: result.player1_strategy,
            opponents: result.opponents.clone(),
            start_time: result.start_time,
            end_time: result.end_time,
            total_games: result.games.len(),
            cooperation_rate: result.metrics.cooperation_rate,
            points_below_optimal: result.metrics.points_below_optimal,
            learning_rate: result.metrics.learning_rate,
        }
    }
}

/// Experiment store backed by plain JSON files
pub struct JsonExperimentStore {
    dir: PathBuf,
    // Serializes summary appends
    lock: Mutex<()>,
}

impl JsonExperimentStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("experiments"),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn experiment_path(&self, experiment_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", experiment_id))
    }

    /// Ids that are not a single plain file name never match a stored experiment
    pub fn load_experiment(&self, experiment_id: &str) -> Result<ExperimentResult, StorageError> {
        let path = self.experiment_path(experiment_id);
        if !is_plain_id(experiment_id) || !path.exists() {
            return Err(StorageError::NotFound(format!("experiment {}", experiment_id)));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All summaries in the order experiments were saved
    pub fn summaries(&self) -> Result<Vec<ExperimentSummary>, StorageError> {
        let path = self.dir.join(SUMMARY_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut summaries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            summaries.push(serde_json::from_str(&line)?);
        }
        Ok(summaries)
    }
}

impl ExperimentStore for JsonExperimentStore {
    fn save_experiment(&self, result: &ExperimentResult) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.experiment_path(&result.experiment_id);
        fs::write(&path, serde_json::to_string_pretty(result)?)?;

        let line = serde_json::to_string(&ExperimentSummary::from(result))?;
        {
            let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(SUMMARY_FILE))?;
            writeln!(file, "{}", line)?;
        }

        info!("Saved experiment {} to {}", result.experiment_id, path.display());
        Ok(())
    }
}

fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDocument {
    completed_games: Vec<GameRecord>,
}

/// Completed single games, kept in one JSON document
pub struct JsonGameHistory {
    path: PathBuf,
}

impl JsonGameHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<HistoryDocument, StorageError> {
        if !self.path.exists() {
            return Ok(HistoryDocument::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, document: &HistoryDocument) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves half a document
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(document)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn save_game(&self, record: &GameRecord) -> Result<(), StorageError> {
        let mut document = self.read()?;
        document.completed_games.push(record.clone());
        self.write(&document)?;
        debug!("Saved game {} to {}", record.game_id, self.path.display());
        Ok(())
    }

    pub fn get_game(&self, game_id: &str) -> Result<Option<GameRecord>, StorageError> {
        Ok(self
            .read()?
            .completed_games
            .into_iter()
            .find(|g| g.game_id == game_id))
    }

    pub fn completed_games(&self) -> Result<Vec<GameRecord>, StorageError> {
        Ok(self.read()?.completed_games)
    }
}
