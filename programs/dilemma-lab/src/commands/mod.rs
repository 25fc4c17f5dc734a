//! Command handlers
//!
//! Each subcommand wires the core engine to the program's adapters:
//! configuration, the Anthropic gateway and JSON storage.

pub mod catalog;
pub mod experiment;
pub mod play;
pub mod results;

use std::sync::Arc;

use anyhow::Result;
use dilemma_logic::{LlmGateway, PayoffMatrix, StrategyFactory};
use tracing::info;

use crate::anthropic::AnthropicGateway;
use crate::cli::{Cli, Command};
use crate::config::{ConfigLoader, LabConfig};
use crate::error::LabError;

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let config = ConfigLoader::load(config_path)?;

    match cli.command {
        Command::Strategies => catalog::strategies(),
        Command::Matrices => catalog::matrices(),
        Command::Play(args) => play::run(&config, args).await,
        Command::Experiment(args) => experiment::run(&config, args).await,
        Command::Experiments => results::list(&config),
        Command::Show { id } => results::show(&config, &id),
        Command::Config => show_config(&config, config_path),
    }
}

/// Build a factory, connecting the model gateway only when an AI strategy
/// will actually be seated
pub fn strategy_factory(
    config: &LabConfig,
    matrix: PayoffMatrix,
    seed: Option<u64>,
    needs_ai: bool,
) -> Result<StrategyFactory, LabError> {
    let factory = StrategyFactory::new(matrix).with_seed(seed.unwrap_or(config.experiment.seed));
    if !needs_ai {
        return Ok(factory);
    }

    let gateway = AnthropicGateway::new(&config.ai)?;
    info!("Using model {}", gateway.model());
    Ok(factory.with_ai(Arc::new(gateway), config.ai.settings()))
}

fn show_config(config: &LabConfig, config_path: Option<&std::path::Path>) -> Result<()> {
    ConfigLoader::print_config_sources(config_path);
    println!();
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dilemma_logic::{ConfigError, MatrixType, Side, StrategyKind};

    #[test]
    fn test_factory_without_ai_needs_no_key() {
        let config = LabConfig::default();
        let factory =
            strategy_factory(&config, MatrixType::Mixed30.matrix(), Some(7), false).unwrap();

        assert!(!factory.has_ai());
        assert_eq!(factory.seed(), 7);
        assert!(factory.build(StrategyKind::Optimal, Side::One).is_ok());
        assert_eq!(
            factory.build(StrategyKind::ClaudeHaiku, Side::One).err(),
            Some(ConfigError::AiUnavailable)
        );
    }

    #[test]
    fn test_factory_with_ai_requires_key() {
        let config = LabConfig::default();
        let result = strategy_factory(&config, PayoffMatrix::classic(), None, true);
        assert!(matches!(result, Err(LabError::Config(ConfigError::MissingApiKey))));
    }

    #[test]
    fn test_factory_with_ai_uses_config_seed() {
        let mut config = LabConfig::default();
        config.ai.api_key = Some("sk-test".to_string());
        config.experiment.seed = 99;

        let factory = strategy_factory(&config, PayoffMatrix::classic(), None, true).unwrap();
        assert!(factory.has_ai());
        assert_eq!(factory.seed(), 99);

        let strategy = factory.build(StrategyKind::ClaudeHaiku, Side::One).unwrap();
        assert_eq!(strategy.kind(), StrategyKind::ClaudeHaiku);
        assert!(strategy.ai_metadata().is_some());
    }
}
