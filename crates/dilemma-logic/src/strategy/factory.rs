//! Strategy construction
//!
//! One factory per experiment or game session. It owns everything a
//! strategy may need at construction time: the active matrix, a base seed,
//! and optionally a gateway for AI-backed strategies.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::ai::{AiSettings, AiStrategy};
use super::{
    AlwaysCooperate, AlwaysDefect, GrimTrigger, MixedOptimal, Pavlov, RandomStrategy, Side,
    Strategy, StrategyKind, TitForTat,
};
use crate::error::ConfigError;
use crate::gateway::LlmGateway;
use crate::payoff::PayoffMatrix;

/// Default base seed for reproducible runs
pub const DEFAULT_SEED: u64 = 42;

/// Builds strategies by kind
pub struct StrategyFactory {
    matrix: PayoffMatrix,
    seed: u64,
    builds: AtomicU32,
    ai: Option<(Arc<dyn LlmGateway>, AiSettings)>,
}

impl StrategyFactory {
    pub fn new(matrix: PayoffMatrix) -> Self {
        Self {
            matrix,
            seed: DEFAULT_SEED,
            builds: AtomicU32::new(0),
            ai: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_matrix(mut self, matrix: PayoffMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Enable `claude_haiku` using the given gateway
    pub fn with_ai(mut self, gateway: Arc<dyn LlmGateway>, settings: AiSettings) -> Self {
        self.ai = Some((gateway, settings));
        self
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    pub fn matrix(&self) -> &PayoffMatrix {
        &self.matrix
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Next per-instance seed: stable for a given base seed and build order
    fn next_seed(&self) -> u64 {
        let n = self.builds.fetch_add(1, Ordering::Relaxed) as u64;
        self.seed
            .wrapping_add(n.wrapping_mul(0x9e3779b97f4a7c15))
            .rotate_left(17)
    }

    pub fn build(&self, kind: StrategyKind, side: Side) -> Result<Box<dyn Strategy>, ConfigError> {
        let strategy: Box<dyn Strategy> = match kind {
            StrategyKind::AlwaysCooperate => Box::new(AlwaysCooperate::new(side)),
            StrategyKind::AlwaysDefect => Box::new(AlwaysDefect::new(side)),
            StrategyKind::TitForTat => Box::new(TitForTat::new(side)),
            StrategyKind::Grim => Box::new(GrimTrigger::new(side)),
            StrategyKind::Pavlov => Box::new(Pavlov::new(side)),
            StrategyKind::Random => Box::new(RandomStrategy::new(side, self.next_seed())),
            StrategyKind::Optimal => {
                let optimal = self
                    .matrix
                    .optimal()
                    .ok_or(ConfigError::NoOptimalStrategy)?;
                Box::new(MixedOptimal::new(
                    side,
                    optimal.cooperation_rate,
                    self.next_seed(),
                ))
            }
            StrategyKind::ClaudeHaiku => {
                let (gateway, settings) = self.ai.as_ref().ok_or(ConfigError::AiUnavailable)?;
                Box::new(AiStrategy::new(
                    side,
                    gateway.clone(),
                    settings.clone(),
                    &self.matrix,
                ))
            }
        };
        Ok(strategy)
    }

    /// Build from a wire identifier such as `"tit_for_tat"`
    pub fn build_named(
        &self,
        id: &str,
        is_player1: bool,
    ) -> Result<Box<dyn Strategy>, ConfigError> {
        let kind = id.parse::<StrategyKind>()?;
        self.build(kind, Side::from_player1_flag(is_player1))
    }
}

impl fmt::Debug for StrategyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyFactory")
            .field("seed", &self.seed)
            .field("builds", &self.builds.load(Ordering::Relaxed))
            .field("ai", &self.ai.as_ref().map(|(g, _)| g.model()))
            .finish()
    }
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::new(PayoffMatrix::classic())
    }
}
