//! Strategy definitions and execution

pub mod ai;
pub mod factory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use self::ai::AiMetadata;
use crate::error::{ConfigError, PayoffError};
use crate::game::RoundResult;
use crate::random::SeededRng;

/// A move in the Prisoner's Dilemma
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Cooperate,
    Defect,
}

impl Move {
    pub fn as_str(&self) -> &'static str {
        match self {
            Move::Cooperate => "cooperate",
            Move::Defect => "defect",
        }
    }

    /// The other move
    pub fn flip(self) -> Self {
        match self {
            Move::Cooperate => Move::Defect,
            Move::Defect => Move::Cooperate,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Move::Cooperate => 0,
            Move::Defect => 1,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Move {
    type Err = PayoffError;

    /// Case-insensitive: accepts `cooperate`, `COOPERATE`, `Defect`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cooperate" => Ok(Move::Cooperate),
            "defect" => Ok(Move::Defect),
            _ => Err(PayoffError::InvalidMove(s.to_string())),
        }
    }
}

/// Which seat a strategy occupies in a game
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "player1")]
    One,
    #[serde(rename = "player2")]
    Two,
}

impl Side {
    pub fn from_player1_flag(is_player1: bool) -> Self {
        if is_player1 {
            Side::One
        } else {
            Side::Two
        }
    }

    pub fn is_player1(&self) -> bool {
        *self == Side::One
    }

    pub fn opponent(&self) -> Self {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::One => f.write_str("player1"),
            Side::Two => f.write_str("player2"),
        }
    }
}

/// Known strategy kinds, keyed by their wire identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Always cooperate, never defect.
    AlwaysCooperate,
    /// Always defect, never cooperate.
    AlwaysDefect,
    /// Copy opponent's last move. Start with cooperate.
    TitForTat,
    /// Cooperate until opponent defects once, then always defect.
    Grim,
    /// Win-stay, lose-shift. Repeat move if good outcome.
    Pavlov,
    /// Uniform random choice each round.
    Random,
    /// Mixed strategy at the matrix's optimal cooperation rate.
    Optimal,
    /// Delegates each decision to a language model.
    ClaudeHaiku,
}

impl StrategyKind {
    pub fn all() -> &'static [StrategyKind] {
        &[
            StrategyKind::AlwaysCooperate,
            StrategyKind::AlwaysDefect,
            StrategyKind::TitForTat,
            StrategyKind::Grim,
            StrategyKind::Pavlov,
            StrategyKind::Random,
            StrategyKind::Optimal,
            StrategyKind::ClaudeHaiku,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::AlwaysCooperate => "always_cooperate",
            StrategyKind::AlwaysDefect => "always_defect",
            StrategyKind::TitForTat => "tit_for_tat",
            StrategyKind::Grim => "grim",
            StrategyKind::Pavlov => "pavlov",
            StrategyKind::Random => "random",
            StrategyKind::Optimal => "optimal",
            StrategyKind::ClaudeHaiku => "claude_haiku",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StrategyKind::AlwaysCooperate => "Always Cooperate",
            StrategyKind::AlwaysDefect => "Always Defect",
            StrategyKind::TitForTat => "Tit for Tat",
            StrategyKind::Grim => "Grim Trigger",
            StrategyKind::Pavlov => "Pavlov",
            StrategyKind::Random => "Random",
            StrategyKind::Optimal => "Optimal",
            StrategyKind::ClaudeHaiku => "Claude Haiku",
        }
    }

    /// Human-readable description of a strategy
    pub fn description(&self) -> &'static str {
        match self {
            StrategyKind::AlwaysCooperate => "Never defects. Always cooperates.",
            StrategyKind::AlwaysDefect => "Never cooperates. Always defects.",
            StrategyKind::TitForTat => "Copies opponent's last move. Starts by cooperating.",
            StrategyKind::Grim => "Cooperates until betrayed, then always defects.",
            StrategyKind::Pavlov => "Repeats move if outcome was good, switches if bad.",
            StrategyKind::Random => "Randomly cooperates or defects each round.",
            StrategyKind::Optimal => {
                "Cooperates at the payoff matrix's game-theoretically optimal rate."
            }
            StrategyKind::ClaudeHaiku => {
                "Asks a language model for each move, cooperating when it cannot answer."
            }
        }
    }

    pub fn is_ai(&self) -> bool {
        matches!(self, StrategyKind::ClaudeHaiku)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

/// Read-only view of a game's round log from one side's perspective.
///
/// Borrows the game's canonical log; strategies never hold a copy.
#[derive(Clone, Copy, Debug)]
pub struct HistoryView<'a> {
    rounds: &'a [RoundResult],
    side: Side,
}

impl<'a> HistoryView<'a> {
    pub fn new(rounds: &'a [RoundResult], side: Side) -> Self {
        Self { rounds, side }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn rounds(&self) -> &'a [RoundResult] {
        self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn last(&self) -> Option<&'a RoundResult> {
        self.rounds.last()
    }

    /// This side's move in round `index` (0-based)
    pub fn my_move(&self, index: usize) -> Option<Move> {
        self.rounds.get(index).map(|r| r.move_of(self.side))
    }

    pub fn opponent_move(&self, index: usize) -> Option<Move> {
        self.rounds.get(index).map(|r| r.move_of(self.side.opponent()))
    }

    pub fn my_score(&self, index: usize) -> Option<f64> {
        self.rounds.get(index).map(|r| r.score_of(self.side))
    }

    pub fn opponent_score(&self, index: usize) -> Option<f64> {
        self.rounds.get(index).map(|r| r.score_of(self.side.opponent()))
    }

    pub fn my_last_move(&self) -> Option<Move> {
        self.last().map(|r| r.move_of(self.side))
    }

    pub fn opponent_last_move(&self) -> Option<Move> {
        self.last().map(|r| r.move_of(self.side.opponent()))
    }

    pub fn my_last_score(&self) -> Option<f64> {
        self.last().map(|r| r.score_of(self.side))
    }

    pub fn opponent_ever_defected(&self) -> bool {
        let opponent = self.side.opponent();
        self.rounds
            .iter()
            .any(|r| r.move_of(opponent) == Move::Defect)
    }
}

/// A pluggable decision procedure for one seat of a game.
///
/// `get_move` always produces a valid move; strategies that talk to
/// external services absorb their own failures.
#[async_trait]
pub trait Strategy: Send {
    /// Display name, also used as the reasoning label for non-AI moves
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    fn side(&self) -> Side;

    fn is_player1(&self) -> bool {
        self.side().is_player1()
    }

    /// Choose a move for `current_round` (0-based) given the rounds so far
    async fn get_move(&mut self, current_round: u32, history: HistoryView<'_>) -> Move;

    /// Called after every completed round with the updated log
    fn add_round(&mut self, _history: HistoryView<'_>) {}

    /// Clear all per-game state
    fn reset(&mut self) {}

    /// Model name, transcript and token count for AI-backed strategies
    fn ai_metadata(&self) -> Option<AiMetadata<'_>> {
        None
    }
}

/// Always cooperate
#[derive(Clone, Debug)]
pub struct AlwaysCooperate {
    side: Side,
}

impl AlwaysCooperate {
    pub fn new(side: Side) -> Self {
        Self { side }
    }
}

#[async_trait]
impl Strategy for AlwaysCooperate {
    fn name(&self) -> &str {
        StrategyKind::AlwaysCooperate.display_name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::AlwaysCooperate
    }

    fn side(&self) -> Side {
        self.side
    }

    async fn get_move(&mut self, _current_round: u32, _history: HistoryView<'_>) -> Move {
        Move::Cooperate
    }
}

/// Always defect
#[derive(Clone, Debug)]
pub struct AlwaysDefect {
    side: Side,
}

impl AlwaysDefect {
    pub fn new(side: Side) -> Self {
        Self { side }
    }
}

#[async_trait]
impl Strategy for AlwaysDefect {
    fn name(&self) -> &str {
        StrategyKind::AlwaysDefect.display_name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::AlwaysDefect
    }

    fn side(&self) -> Side {
        self.side
    }

    async fn get_move(&mut self, _current_round: u32, _history: HistoryView<'_>) -> Move {
        Move::Defect
    }
}

/// Tit-for-Tat: Copy opponent's last move, start with cooperate
#[derive(Clone, Debug)]
pub struct TitForTat {
    side: Side,
}

impl TitForTat {
    pub fn new(side: Side) -> Self {
        Self { side }
    }
}

#[async_trait]
impl Strategy for TitForTat {
    fn name(&self) -> &str {
        StrategyKind::TitForTat.display_name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::TitForTat
    }

    fn side(&self) -> Side {
        self.side
    }

    async fn get_move(&mut self, _current_round: u32, history: HistoryView<'_>) -> Move {
        history.opponent_last_move().unwrap_or(Move::Cooperate)
    }
}

/// Grim Trigger: Cooperate until opponent defects, then always defect
///
/// The trigger latches; only `reset` clears it.
#[derive(Clone, Debug)]
pub struct GrimTrigger {
    side: Side,
    triggered: bool,
}

impl GrimTrigger {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            triggered: false,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    fn observe(&mut self, history: HistoryView<'_>) {
        if history.opponent_ever_defected() {
            self.triggered = true;
        }
    }
}

#[async_trait]
impl Strategy for GrimTrigger {
    fn name(&self) -> &str {
        StrategyKind::Grim.display_name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Grim
    }

    fn side(&self) -> Side {
        self.side
    }

    async fn get_move(&mut self, _current_round: u32, history: HistoryView<'_>) -> Move {
        self.observe(history);
        if self.triggered {
            Move::Defect
        } else {
            Move::Cooperate
        }
    }

    fn add_round(&mut self, history: HistoryView<'_>) {
        self.observe(history);
    }

    fn reset(&mut self) {
        self.triggered = false;
    }
}

/// Own-score threshold at or above which Pavlov counts a round as a win
pub const PAVLOV_WIN_THRESHOLD: f64 = 3.0;

/// Pavlov: Win-stay, lose-shift
/// - If last round was good (3+ points), repeat move
/// - If last round was bad (<3 points), switch move
#[derive(Clone, Debug)]
pub struct Pavlov {
    side: Side,
}

impl Pavlov {
    pub fn new(side: Side) -> Self {
        Self { side }
    }
}

#[async_trait]
impl Strategy for Pavlov {
    fn name(&self) -> &str {
        StrategyKind::Pavlov.display_name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Pavlov
    }

    fn side(&self) -> Side {
        self.side
    }

    async fn get_move(&mut self, _current_round: u32, history: HistoryView<'_>) -> Move {
        let (Some(my_last), Some(my_score)) = (history.my_last_move(), history.my_last_score())
        else {
            return Move::Cooperate;
        };

        if my_score >= PAVLOV_WIN_THRESHOLD {
            my_last
        } else {
            my_last.flip()
        }
    }
}

/// Random: uniform choice from a strategy-local seeded generator
#[derive(Clone, Debug)]
pub struct RandomStrategy {
    side: Side,
    seed: u64,
    rng: SeededRng,
}

impl RandomStrategy {
    pub fn new(side: Side, seed: u64) -> Self {
        Self {
            side,
            seed,
            rng: SeededRng::new(seed, 0),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[async_trait]
impl Strategy for RandomStrategy {
    fn name(&self) -> &str {
        StrategyKind::Random.display_name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Random
    }

    fn side(&self) -> Side {
        self.side
    }

    async fn get_move(&mut self, _current_round: u32, _history: HistoryView<'_>) -> Move {
        if self.rng.next_bool() {
            Move::Cooperate
        } else {
            Move::Defect
        }
    }

    fn reset(&mut self) {
        self.rng = SeededRng::new(self.seed, 0);
    }
}

/// Mixed strategy: cooperate with probability `p` each round, no memory
#[derive(Clone, Debug)]
pub struct MixedOptimal {
    name: String,
    side: Side,
    cooperation_rate: f64,
    seed: u64,
    rng: SeededRng,
}

impl MixedOptimal {
    pub fn new(side: Side, cooperation_rate: f64, seed: u64) -> Self {
        let cooperation_rate = cooperation_rate.clamp(0.0, 1.0);
        Self {
            name: format!("Optimal (p={:.2})", cooperation_rate),
            side,
            cooperation_rate,
            seed,
            rng: SeededRng::new(seed, 1),
        }
    }

    pub fn cooperation_rate(&self) -> f64 {
        self.cooperation_rate
    }
}

#[async_trait]
impl Strategy for MixedOptimal {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Optimal
    }

    fn side(&self) -> Side {
        self.side
    }

    async fn get_move(&mut self, _current_round: u32, _history: HistoryView<'_>) -> Move {
        // Pure strategies never touch the generator
        if self.cooperation_rate <= 0.0 {
            return Move::Defect;
        }
        if self.cooperation_rate >= 1.0 {
            return Move::Cooperate;
        }

        if self.rng.next_f64() < self.cooperation_rate {
            Move::Cooperate
        } else {
            Move::Defect
        }
    }

    fn reset(&mut self) {
        self.rng = SeededRng::new(self.seed, 1);
    }
}
