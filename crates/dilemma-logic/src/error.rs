//! Error types for games, strategies and experiments

use crate::strategy::Side;
use thiserror::Error;

/// Errors from building or consulting a payoff matrix
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayoffError {
    #[error("Invalid move combination: {own}, {opponent} ({reason})")]
    InvalidCombination {
        own: String,
        opponent: String,
        reason: String,
    },

    #[error("Invalid move: {0} (expected cooperate or defect)")]
    InvalidMove(String),

    #[error("Optimal cooperation rate must be within [0, 1], got {0}")]
    InvalidOptimalRate(f64),
}

/// Configuration errors, surfaced at construction time
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown strategy type: {0}")]
    UnknownStrategy(String),

    #[error("Unknown matrix type: {0}")]
    UnknownMatrix(String),

    #[error("Round count must be at least 1, got {0}")]
    InvalidRoundCount(u32),

    #[error("API key cannot be empty")]
    MissingApiKey,

    #[error("Strategy claude_haiku needs an AI gateway, but none is configured")]
    AiUnavailable,

    #[error("Strategy seated as {found} cannot play as {expected}")]
    SeatMismatch { expected: Side, found: Side },

    #[error("Payoff matrix has no optimal strategy annotation")]
    NoOptimalStrategy,
}

/// Errors raised by the game state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Cannot process round: game is already over ({rounds_played} rounds played)")]
    GameAlreadyOver { rounds_played: u32 },

    #[error("Game still in progress: round {current_round} of {max_rounds}")]
    GameInProgress { current_round: u32, max_rounds: u32 },
}

/// Errors raised by experiment stores
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Errors that abort an experiment run
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("No games to analyze")]
    NoGamesToAnalyze,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Game task failed: {0}")]
    TaskFailed(String),
}
