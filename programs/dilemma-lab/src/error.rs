//! Error types for the lab program

use dilemma_logic::{ConfigError, ExperimentError, GameError, GatewayError, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Experiment(#[from] ExperimentError),
}
