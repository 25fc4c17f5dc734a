//! CLI command definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dilemma_logic::{MatrixType, StrategyKind};

/// CLI arguments for dilemma-lab
#[derive(Parser, Debug)]
#[command(name = "dilemma-lab")]
#[command(author, version, about = "Iterated Prisoner's Dilemma games and AI experiments")]
#[command(long_about = r#"
Dilemma Lab plays the Iterated Prisoner's Dilemma between classic strategies
and a language-model player, and runs experiments that measure how the model
cooperates under different payoff matrices.

Configuration files are loaded from (in priority order):
1. DILEMMA_* environment variables (DILEMMA_AI__MODEL, DILEMMA_STORAGE__DATA_DIR)
2. --config <path>     Explicit config file
3. ./dilemma.toml      Project-level config
4. ~/.config/dilemma-lab/config.toml   Global config

The API key is read from ai.api_key or ANTHROPIC_API_KEY.

Example:
  dilemma-lab play tit_for_tat always_defect --rounds 20
  dilemma-lab experiment --matrix mixed_30 --games 10 --opponents grim,pavlov
  dilemma-lab show exp-1a2b3c4d
"#)]
pub struct Cli {
    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available strategies
    Strategies,

    /// List built-in payoff matrices with their optimal play
    Matrices,

    /// Play a single game between two strategies
    Play(PlayArgs),

    /// Run an experiment: the subject against every opponent, many games each
    Experiment(ExperimentArgs),

    /// List stored experiments
    Experiments,

    /// Print a stored experiment or saved game
    Show {
        /// Experiment id (exp-...) or game id (game-...)
        id: String,
    },

    /// Show configuration sources and the merged configuration
    Config,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Strategy seated as player 1
    pub player1: StrategyKind,

    /// Strategy seated as player 2
    pub player2: StrategyKind,

    /// Number of rounds [default: experiment.num_rounds]
    #[arg(short, long)]
    pub rounds: Option<u32>,

    /// Payoff matrix
    #[arg(short, long, default_value = "baseline")]
    pub matrix: MatrixType,

    /// Base seed for random and optimal strategies [default: experiment.seed]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Append the finished game to the game history
    #[arg(long)]
    pub save: bool,

    /// Print the finished game as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ExperimentArgs {
    /// Payoff matrix
    #[arg(short, long, default_value = "baseline")]
    pub matrix: MatrixType,

    /// Games per opponent [default: experiment.num_games]
    #[arg(short, long)]
    pub games: Option<u32>,

    /// Rounds per game [default: experiment.num_rounds]
    #[arg(short, long)]
    pub rounds: Option<u32>,

    /// Strategy under test, always player 1
    #[arg(short, long, default_value = "claude_haiku")]
    pub subject: StrategyKind,

    /// Opponents, comma separated [default: the five classic strategies]
    #[arg(short, long, value_delimiter = ',', value_name = "STRATEGY")]
    pub opponents: Vec<StrategyKind>,

    /// Games in flight at once [default: experiment.max_concurrent_games]
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Base seed for random and optimal strategies [default: experiment.seed]
    #[arg(long)]
    pub seed: Option<u64>,
}
