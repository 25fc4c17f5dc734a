//! Dilemma Logic
//!
//! Core engine for Iterated Prisoner's Dilemma experiments: moves and
//! payoff matrices, rule-based and AI-backed strategies, the game state
//! machine, and the experiment runner with its metrics.
//!
//! No network or file I/O lives here. The language-model gateway, the
//! experiment store and progress reporting are ports implemented by the
//! program crate.

pub mod error;
pub mod experiment;
pub mod game;
pub mod gateway;
pub mod metrics;
pub mod payoff;
pub mod random;
pub mod strategy;

pub use error::{ConfigError, ExperimentError, GameError, PayoffError, StorageError};
pub use experiment::{
    ExperimentConfig, ExperimentProgress, ExperimentResult, ExperimentRunner, ExperimentStore,
    GameResult, NoProgress,
};
pub use game::{AiSummary, Game, GameRecord, GameState, RoundAiMetadata, RoundResult};
pub use gateway::{Completion, CompletionRequest, GatewayError, LlmGateway, TokenUsage};
pub use metrics::{compute_metrics, ExperimentMetrics};
pub use payoff::{MatrixType, OptimalStrategy, PayoffEntry, PayoffMatrix};
pub use random::SeededRng;
pub use strategy::ai::{AiMetadata, AiSettings, AiStrategy, TranscriptEntry};
pub use strategy::factory::StrategyFactory;
pub use strategy::{HistoryView, Move, Side, Strategy, StrategyKind};
