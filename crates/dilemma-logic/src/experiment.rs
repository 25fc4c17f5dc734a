//! Experiment runner
//!
//! Plays a subject strategy against a list of opponents, many games each,
//! then aggregates the results and hands them to a store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::error::{ConfigError, ExperimentError, GameError, StorageError};
use crate::game::{Game, RoundResult};
use crate::metrics::{compute_metrics, cooperation_rate, ExperimentMetrics};
use crate::payoff::{MatrixType, PayoffMatrix};
use crate::random::generate_id;
use crate::strategy::factory::StrategyFactory;
use crate::strategy::{Side, StrategyKind};

fn default_num_games() -> u32 {
    100
}

fn default_num_rounds() -> u32 {
    10
}

fn default_opponents() -> Vec<StrategyKind> {
    vec![
        StrategyKind::AlwaysCooperate,
        StrategyKind::AlwaysDefect,
        StrategyKind::TitForTat,
        StrategyKind::Random,
        StrategyKind::ClaudeHaiku,
    ]
}

fn default_subject() -> StrategyKind {
    StrategyKind::ClaudeHaiku
}

fn default_max_concurrent_games() -> usize {
    1
}

/// What to run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub matrix_type: MatrixType,
    #[serde(default = "default_num_games")]
    pub num_games: u32,
    #[serde(default = "default_num_rounds")]
    pub num_rounds: u32,
    /// Opponents, played in this order
    #[serde(default = "default_opponents")]
    pub strategies_to_test: Vec<StrategyKind>,
    /// Always seated as player 1
    #[serde(default = "default_subject")]
    pub subject: StrategyKind,
    /// Games allowed in flight at once; 1 runs sequentially
    #[serde(default = "default_max_concurrent_games")]
    pub max_concurrent_games: usize,
}

impl ExperimentConfig {
    pub fn new(matrix_type: MatrixType) -> Self {
        Self {
            matrix_type,
            num_games: default_num_games(),
            num_rounds: default_num_rounds(),
            strategies_to_test: default_opponents(),
            subject: default_subject(),
            max_concurrent_games: default_max_concurrent_games(),
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::new(MatrixType::Baseline)
    }
}

/// One finished game inside an experiment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub game_id: String,
    /// 1-based position within the opponent's batch
    pub game_number: u32,
    pub opponent: StrategyKind,
    pub rounds: Vec<RoundResult>,
    /// (subject, opponent)
    pub final_scores: (f64, f64),
    pub cooperation_rate: f64,
    pub total_rounds: u32,
}

/// Everything an experiment produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: String,
    pub matrix_type: MatrixType,
    pub config: ExperimentConfig,
    pub player1_strategy: StrategyKind,
    pub opponents: Vec<StrategyKind>,
    pub payoff_matrix: PayoffMatrix,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub games: Vec<GameResult>,
    pub metrics: ExperimentMetrics,
}

/// Callback for progress updates while an experiment runs
pub trait ExperimentProgress: Send + Sync {
    /// Called once a game is constructed, before it is played
    fn on_game_scheduled(&self, opponent: StrategyKind, game_number: u32, current_round: u32);
}

impl<F> ExperimentProgress for F
where
    F: Fn(StrategyKind, u32, u32) + Send + Sync,
{
    fn on_game_scheduled(&self, opponent: StrategyKind, game_number: u32, current_round: u32) {
        self(opponent, game_number, current_round)
    }
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl ExperimentProgress for NoProgress {
    fn on_game_scheduled(&self, _opponent: StrategyKind, _game_number: u32, _current_round: u32) {}
}

/// Where finished experiments go
pub trait ExperimentStore: Send + Sync {
    fn save_experiment(&self, result: &ExperimentResult) -> Result<(), StorageError>;
}

/// A constructed game waiting to be played
struct ScheduledGame {
    index: usize,
    opponent: StrategyKind,
    game_number: u32,
    game: Game,
}

/// Runs one experiment configuration
pub struct ExperimentRunner {
    experiment_id: String,
    config: ExperimentConfig,
    matrix: PayoffMatrix,
    factory: StrategyFactory,
    store: Arc<dyn ExperimentStore>,
    progress: Box<dyn ExperimentProgress>,
}

impl ExperimentRunner {
    /// The factory is re-targeted at the configured matrix
    pub fn new(
        config: ExperimentConfig,
        factory: StrategyFactory,
        store: Arc<dyn ExperimentStore>,
    ) -> Self {
        let matrix = config.matrix_type.matrix();
        Self {
            experiment_id: generate_id("exp"),
            factory: factory.with_matrix(matrix.clone()),
            matrix,
            config,
            store,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: impl ExperimentProgress + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub async fn run_full_experiment(&self) -> Result<ExperimentResult, ExperimentError> {
        if self.config.num_rounds < 1 {
            return Err(ConfigError::InvalidRoundCount(self.config.num_rounds).into());
        }

        let start_time = Utc::now();
        info!(
            "Starting experiment {} with matrix {}",
            self.experiment_id, self.config.matrix_type
        );

        let games = if self.config.max_concurrent_games > 1 {
            self.run_concurrent().await?
        } else {
            self.run_sequential().await?
        };

        let end_time = Utc::now();
        let metrics = compute_metrics(&games, &self.matrix)?;

        let result = ExperimentResult {
            experiment_id: self.experiment_id.clone(),
            matrix_type: self.config.matrix_type,
            config: self.config.clone(),
            player1_strategy: self.config.subject,
            opponents: self.config.strategies_to_test.clone(),
            payoff_matrix: self.matrix.clone(),
            start_time,
            end_time,
            games,
            metrics,
        };

        self.store.save_experiment(&result)?;
        info!(
            "Experiment {} complete: {} games, cooperation rate {:.3}",
            self.experiment_id,
            result.games.len(),
            result.metrics.cooperation_rate
        );

        Ok(result)
    }

    /// `(index, opponent, game_number)` for every game, in encounter order
    fn encounters(&self) -> impl Iterator<Item = (usize, StrategyKind, u32)> + '_ {
        let num_games = self.config.num_games;
        self.config
            .strategies_to_test
            .iter()
            .copied()
            .flat_map(move |opponent| (1..=num_games).map(move |n| (opponent, n)))
            .enumerate()
            .map(|(index, (opponent, game_number))| (index, opponent, game_number))
    }

    /// Build one game and report it as scheduled
    fn schedule_game(
        &self,
        index: usize,
        opponent: StrategyKind,
        game_number: u32,
    ) -> Result<ScheduledGame, ExperimentError> {
        if game_number == 1 {
            info!("Testing against {}", opponent);
        }
        let game = self.build_game(opponent)?;
        self.progress
            .on_game_scheduled(opponent, game_number, game.current_round());
        Ok(ScheduledGame {
            index,
            opponent,
            game_number,
            game,
        })
    }

    /// Subject as player 1, a fresh opponent instance as player 2
    fn build_game(&self, opponent: StrategyKind) -> Result<Game, ConfigError> {
        let player1 = self.factory.build(self.config.subject, Side::One)?;
        let player2 = self.factory.build(opponent, Side::Two)?;
        Game::new(
            player1,
            player2,
            self.config.num_rounds,
            Some(self.matrix.clone()),
        )
    }

    async fn run_sequential(&self) -> Result<Vec<GameResult>, ExperimentError> {
        let mut results = Vec::new();
        for (index, opponent, game_number) in self.encounters() {
            let scheduled = self.schedule_game(index, opponent, game_number)?;
            let (_, result) = play(scheduled).await?;
            results.push(result);
        }
        Ok(results)
    }

    /// Games are only built once a permit is held, so at most
    /// `max_concurrent_games` exist at a time.
    async fn run_concurrent(&self) -> Result<Vec<GameResult>, ExperimentError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_games));
        let mut join_set = JoinSet::new();
        let mut indexed = Vec::new();

        for (index, opponent, game_number) in self.encounters() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| ExperimentError::TaskFailed(e.to_string()))?;

            while let Some(joined) = join_set.try_join_next() {
                match finished(joined) {
                    Ok(entry) => indexed.push(entry),
                    Err(e) => {
                        join_set.abort_all();
                        return Err(e);
                    }
                }
            }

            let scheduled = match self.schedule_game(index, opponent, game_number) {
                Ok(scheduled) => scheduled,
                Err(e) => {
                    join_set.abort_all();
                    return Err(e);
                }
            };
            join_set.spawn(async move {
                let _permit = permit;
                play(scheduled).await.map_err(ExperimentError::from)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match finished(joined) {
                Ok(entry) => indexed.push(entry),
                Err(e) => {
                    join_set.abort_all();
                    return Err(e);
                }
            }
        }

        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, result)| result).collect())
    }
}

type PlayedGame = (usize, GameResult);

fn finished(
    joined: Result<Result<PlayedGame, ExperimentError>, JoinError>,
) -> Result<PlayedGame, ExperimentError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Game task failed: {}", e);
            Err(ExperimentError::TaskFailed(e.to_string()))
        }
    }
}

async fn play(scheduled: ScheduledGame) -> Result<PlayedGame, GameError> {
    let ScheduledGame {
        index,
        opponent,
        game_number,
        mut game,
    } = scheduled;

    let rounds = match game.run_all_rounds().await {
        Ok(rounds) => rounds,
        Err(e) => {
            error!("Error in game {}: {}", game.id(), e);
            return Err(e);
        }
    };

    let result = GameResult {
        game_id: game.id().to_string(),
        game_number,
        opponent,
        cooperation_rate: cooperation_rate(&rounds),
        total_rounds: rounds.len() as u32,
        final_scores: game.scores(),
        rounds,
    };
    Ok((index, result))
}
