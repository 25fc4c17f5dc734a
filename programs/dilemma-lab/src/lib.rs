//! Dilemma Lab
//!
//! Command-line program around `dilemma-logic`: layered configuration,
//! the Anthropic Messages API gateway for AI-backed strategies, JSON file
//! storage for experiments and saved games, and the command handlers.

pub mod anthropic;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod storage;

pub use anthropic::AnthropicGateway;
pub use cli::{Cli, Command};
pub use config::{AiConfig, ConfigLoader, ExperimentDefaults, LabConfig, StorageConfig};
pub use error::LabError;
pub use storage::{ExperimentSummary, JsonExperimentStore, JsonGameHistory};
