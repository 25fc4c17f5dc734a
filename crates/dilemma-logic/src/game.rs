//! Game execution engine
//!
//! A game seats two strategies, asks each for a move every round (player 1
//! first), scores the pair against the payoff matrix and keeps the one
//! canonical round log both strategies read from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, GameError};
use crate::gateway::TokenUsage;
use crate::payoff::PayoffMatrix;
use crate::random::generate_id;
use crate::strategy::ai::TranscriptEntry;
use crate::strategy::{HistoryView, Move, Side, Strategy, StrategyKind};

/// AI bookkeeping attached to a round when either side is AI-backed
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundAiMetadata {
    /// Full usage of the round's AI decisions, both sides combined
    pub token_usage: TokenUsage,
    pub api_error: Option<String>,
}

/// Result of a single round
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    /// 1-based
    pub round_number: u32,
    pub player1_move: Move,
    pub player2_move: Move,
    pub player1_reasoning: String,
    pub player2_reasoning: String,
    pub player1_score: f64,
    pub player2_score: f64,
    pub cumulative_player1_score: f64,
    pub cumulative_player2_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_metadata: Option<RoundAiMetadata>,
}

impl RoundResult {
    pub fn move_of(&self, side: Side) -> Move {
        match side {
            Side::One => self.player1_move,
            Side::Two => self.player2_move,
        }
    }

    pub fn score_of(&self, side: Side) -> f64 {
        match side {
            Side::One => self.player1_score,
            Side::Two => self.player2_score,
        }
    }

    pub fn cumulative_of(&self, side: Side) -> f64 {
        match side {
            Side::One => self.cumulative_player1_score,
            Side::Two => self.cumulative_player2_score,
        }
    }

    pub fn reasoning_of(&self, side: Side) -> &str {
        match side {
            Side::One => &self.player1_reasoning,
            Side::Two => &self.player2_reasoning,
        }
    }

    pub fn cooperations(&self) -> usize {
        [self.player1_move, self.player2_move]
            .iter()
            .filter(|m| **m == Move::Cooperate)
            .count()
    }
}

/// Serializable snapshot of a game in progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: String,
    pub current_round: u32,
    pub max_rounds: u32,
    pub is_game_over: bool,
    pub player1_strategy: String,
    pub player2_strategy: String,
    pub player1_score: f64,
    pub player2_score: f64,
    pub rounds: Vec<RoundResult>,
    pub payoff_matrix: PayoffMatrix,
}

/// Model usage of one AI-backed side over a whole game
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiSummary {
    pub side: Side,
    pub model: String,
    pub total_tokens: u32,
    pub transcript: Vec<TranscriptEntry>,
}

/// Plain-data record of a finished game
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: String,
    pub created_at: DateTime<Utc>,
    pub player1_kind: StrategyKind,
    pub player2_kind: StrategyKind,
    pub player1_strategy: String,
    pub player2_strategy: String,
    pub payoff_matrix: PayoffMatrix,
    pub num_rounds: u32,
    pub rounds: Vec<RoundResult>,
    pub final_scores: (f64, f64),
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ai_summaries: Vec<AiSummary>,
}

/// An iterated game between two seated strategies
pub struct Game {
    id: String,
    created_at: DateTime<Utc>,
    player1: Box<dyn Strategy>,
    player2: Box<dyn Strategy>,
    matrix: PayoffMatrix,
    max_rounds: u32,
    current_round: u32,
    rounds: Vec<RoundResult>,
    player1_score: f64,
    player2_score: f64,
    forced_over: bool,
}

impl Game {
    /// Seat two strategies for at most `max_rounds` rounds.
    ///
    /// Uses the classic matrix when `matrix` is `None`.
    pub fn new(
        player1: Box<dyn Strategy>,
        player2: Box<dyn Strategy>,
        max_rounds: u32,
        matrix: Option<PayoffMatrix>,
    ) -> Result<Self, ConfigError> {
        if max_rounds < 1 {
            return Err(ConfigError::InvalidRoundCount(max_rounds));
        }
        if player1.side() != Side::One {
            return Err(ConfigError::SeatMismatch {
                expected: Side::One,
                found: player1.side(),
            });
        }
        if player2.side() != Side::Two {
            return Err(ConfigError::SeatMismatch {
                expected: Side::Two,
                found: player2.side(),
            });
        }

        Ok(Self {
            id: generate_id("game"),
            created_at: Utc::now(),
            player1,
            player2,
            matrix: matrix.unwrap_or_default(),
            max_rounds,
            current_round: 0,
            rounds: Vec::new(),
            player1_score: 0.0,
            player2_score: 0.0,
            forced_over: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn player1(&self) -> &dyn Strategy {
        self.player1.as_ref()
    }

    pub fn player2(&self) -> &dyn Strategy {
        self.player2.as_ref()
    }

    pub fn matrix(&self) -> &PayoffMatrix {
        &self.matrix
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn is_game_over(&self) -> bool {
        self.forced_over || self.current_round >= self.max_rounds
    }

    /// Cumulative `(player1, player2)` scores
    pub fn scores(&self) -> (f64, f64) {
        (self.player1_score, self.player2_score)
    }

    pub fn rounds(&self) -> &[RoundResult] {
        &self.rounds
    }

    /// Play one round
    pub async fn process_round(&mut self) -> Result<RoundResult, GameError> {
        if self.is_game_over() {
            return Err(GameError::GameAlreadyOver {
                rounds_played: self.current_round,
            });
        }

        let n = self.current_round;
        let move1 = self
            .player1
            .get_move(n, HistoryView::new(&self.rounds, Side::One))
            .await;
        let move2 = self
            .player2
            .get_move(n, HistoryView::new(&self.rounds, Side::Two))
            .await;

        let (score1, score2) = self.matrix.payoff(move1, move2);
        self.player1_score += score1;
        self.player2_score += score2;

        let round_number = n + 1;
        let result = RoundResult {
            round_number,
            player1_move: move1,
            player2_move: move2,
            player1_reasoning: reasoning(self.player1.as_ref()),
            player2_reasoning: reasoning(self.player2.as_ref()),
            player1_score: score1,
            player2_score: score2,
            cumulative_player1_score: self.player1_score,
            cumulative_player2_score: self.player2_score,
            ai_metadata: round_ai_metadata(
                round_number,
                [self.player1.as_ref(), self.player2.as_ref()],
            ),
        };

        debug!(
            game_id = %self.id,
            round = round_number,
            player1 = %move1,
            player2 = %move2,
            "Round complete: {} - {}",
            score1,
            score2
        );

        self.rounds.push(result.clone());
        self.player1.add_round(HistoryView::new(&self.rounds, Side::One));
        self.player2.add_round(HistoryView::new(&self.rounds, Side::Two));
        self.current_round += 1;

        Ok(result)
    }

    /// Play until the game is over; returns only the rounds played by this call
    pub async fn run_all_rounds(&mut self) -> Result<Vec<RoundResult>, GameError> {
        if self.is_game_over() {
            return Err(GameError::GameAlreadyOver {
                rounds_played: self.current_round,
            });
        }

        let mut played = Vec::new();
        while !self.is_game_over() {
            played.push(self.process_round().await?);
        }
        Ok(played)
    }

    /// Back to round 0 with both strategies reset
    pub fn reset(&mut self) {
        self.current_round = 0;
        self.rounds.clear();
        self.player1_score = 0.0;
        self.player2_score = 0.0;
        self.forced_over = false;
        self.player1.reset();
        self.player2.reset();
    }

    /// Abort: the game becomes terminal immediately
    pub fn end_early(&mut self) {
        self.forced_over = true;
    }

    pub fn state(&self) -> GameState {
        GameState {
            game_id: self.id.clone(),
            current_round: self.current_round,
            max_rounds: self.max_rounds,
            is_game_over: self.is_game_over(),
            player1_strategy: self.player1.name().to_string(),
            player2_strategy: self.player2.name().to_string(),
            player1_score: self.player1_score,
            player2_score: self.player2_score,
            rounds: self.rounds.clone(),
            payoff_matrix: self.matrix.clone(),
        }
    }

    /// Snapshot of a finished game
    pub fn record(&self) -> Result<GameRecord, GameError> {
        if !self.is_game_over() {
            return Err(GameError::GameInProgress {
                current_round: self.current_round,
                max_rounds: self.max_rounds,
            });
        }

        let ai_summaries = [self.player1.as_ref(), self.player2.as_ref()]
            .into_iter()
            .filter_map(|player| {
                player.ai_metadata().map(|meta| AiSummary {
                    side: player.side(),
                    model: meta.model.to_string(),
                    total_tokens: meta.total_tokens,
                    transcript: meta.transcript.to_vec(),
                })
            })
            .collect();

        Ok(GameRecord {
            game_id: self.id.clone(),
            created_at: self.created_at,
            player1_kind: self.player1.kind(),
            player2_kind: self.player2.kind(),
            player1_strategy: self.player1.name().to_string(),
            player2_strategy: self.player2.name().to_string(),
            payoff_matrix: self.matrix.clone(),
            num_rounds: self.current_round,
            rounds: self.rounds.clone(),
            final_scores: self.scores(),
            ai_summaries,
        })
    }
}

/// AI sides explain themselves through the transcript; everyone else by name
fn reasoning(player: &dyn Strategy) -> String {
    player
        .ai_metadata()
        .and_then(|meta| meta.last_entry().map(|e| e.reasoning.clone()))
        .unwrap_or_else(|| player.name().to_string())
}

fn round_ai_metadata(round_number: u32, players: [&dyn Strategy; 2]) -> Option<RoundAiMetadata> {
    let mut metadata: Option<RoundAiMetadata> = None;
    let mut errors = Vec::new();

    for meta in players.into_iter().filter_map(|p| p.ai_metadata()) {
        let entry = metadata.get_or_insert_with(RoundAiMetadata::default);
        for transcript_entry in meta.transcript.iter().filter(|e| e.round == round_number) {
            entry.token_usage += transcript_entry.token_usage;
        }
        if let Some(error) = meta.last_error {
            errors.push(error.to_string());
        }
    }

    metadata.map(|mut m| {
        if !errors.is_empty() {
            m.api_error = Some(errors.join("; "));
        }
        m
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ai::tests::{fast_settings, reply, MockGateway};
    use crate::strategy::ai::AiStrategy;
    use crate::strategy::{AlwaysCooperate, AlwaysDefect, GrimTrigger, TitForTat};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Plays a fixed script, then cooperates
    struct Scripted {
        side: Side,
        script: Vec<Move>,
        moves: VecDeque<Move>,
    }

    impl Scripted {
        fn new(side: Side, script: &[Move]) -> Self {
            Self {
                side,
                script: script.to_vec(),
                moves: script.iter().copied().collect(),
            }
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn kind(&self) -> StrategyKind {
            StrategyKind::AlwaysCooperate
        }

        fn side(&self) -> Side {
            self.side
        }

        async fn get_move(&mut self, _current_round: u32, _history: HistoryView<'_>) -> Move {
            self.moves.pop_front().unwrap_or(Move::Cooperate)
        }

        fn reset(&mut self) {
            self.moves = self.script.iter().copied().collect();
        }
    }

    use crate::strategy::Move::{Cooperate as C, Defect as D};

    fn moves(rounds: &[RoundResult], side: Side) -> Vec<Move> {
        rounds.iter().map(|r| r.move_of(side)).collect()
    }

    #[tokio::test]
    async fn test_mutual_cooperation_ten_rounds() {
        let mut game = Game::new(
            Box::new(AlwaysCooperate::new(Side::One)),
            Box::new(AlwaysCooperate::new(Side::Two)),
            10,
            None,
        )
        .unwrap();

        let rounds = game.run_all_rounds().await.unwrap();
        assert_eq!(rounds.len(), 10);
        assert!(game.is_game_over());
        assert_eq!(game.current_round(), 10);
        assert_eq!(game.scores(), (30.0, 30.0));
        for (i, r) in rounds.iter().enumerate() {
            assert_eq!((r.player1_score, r.player2_score), (3.0, 3.0));
            let expected = 3.0 * (i + 1) as f64;
            assert_eq!(
                (r.cumulative_player1_score, r.cumulative_player2_score),
                (expected, expected)
            );
        }

        let last = rounds.last().unwrap();
        assert_eq!(last.round_number, 10);
        assert_eq!(last.player1_reasoning, "Always Cooperate");
        assert!(last.ai_metadata.is_none());
    }

    #[tokio::test]
    async fn test_round_after_game_over_fails() {
        let mut game = Game::new(
            Box::new(AlwaysDefect::new(Side::One)),
            Box::new(AlwaysCooperate::new(Side::Two)),
            2,
            None,
        )
        .unwrap();
        game.run_all_rounds().await.unwrap();

        assert_eq!(
            game.process_round().await.unwrap_err(),
            GameError::GameAlreadyOver { rounds_played: 2 }
        );
        assert_eq!(
            game.run_all_rounds().await.unwrap_err(),
            GameError::GameAlreadyOver { rounds_played: 2 }
        );
        assert_eq!(game.scores(), (10.0, 0.0));
    }

    #[test]
    fn test_new_validates_rounds_and_seats() {
        let err = Game::new(
            Box::new(AlwaysCooperate::new(Side::One)),
            Box::new(AlwaysCooperate::new(Side::Two)),
            0,
            None,
        )
        .err();
        assert_eq!(err, Some(ConfigError::InvalidRoundCount(0)));

        let err = Game::new(
            Box::new(AlwaysCooperate::new(Side::One)),
            Box::new(AlwaysCooperate::new(Side::One)),
            5,
            None,
        )
        .err();
        assert_eq!(
            err,
            Some(ConfigError::SeatMismatch {
                expected: Side::Two,
                found: Side::One
            })
        );
    }

    #[tokio::test]
    async fn test_tit_for_tat_mirrors_opponent() {
        let mut game = Game::new(
            Box::new(TitForTat::new(Side::One)),
            Box::new(Scripted::new(Side::Two, &[D, C, C, C])),
            4,
            None,
        )
        .unwrap();
        let rounds = game.run_all_rounds().await.unwrap();

        assert_eq!(moves(&rounds, Side::One), vec![C, D, C, C]);
        assert_eq!(moves(&rounds, Side::Two), vec![D, C, C, C]);
    }

    #[tokio::test]
    async fn test_tit_for_tat_mirrors_opponent_from_second_seat() {
        let mut game = Game::new(
            Box::new(Scripted::new(Side::One, &[D, C, C, C])),
            Box::new(TitForTat::new(Side::Two)),
            4,
            None,
        )
        .unwrap();
        let rounds = game.run_all_rounds().await.unwrap();

        assert_eq!(moves(&rounds, Side::Two), vec![C, D, C, C]);
        assert_eq!(rounds[0].player2_score, 0.0);
        assert_eq!(rounds[1].player2_score, 5.0);
    }

    #[tokio::test]
    async fn test_huge_round_cap_allocates_lazily() {
        let mut game = Game::new(
            Box::new(AlwaysCooperate::new(Side::One)),
            Box::new(AlwaysDefect::new(Side::Two)),
            u32::MAX,
            None,
        )
        .unwrap();
        assert_eq!(game.max_rounds(), u32::MAX);

        game.process_round().await.unwrap();
        game.process_round().await.unwrap();
        game.end_early();

        assert_eq!(game.rounds().len(), 2);
        assert_eq!(game.record().unwrap().num_rounds, 2);
    }

    #[tokio::test]
    async fn test_grim_never_forgives() {
        let mut game = Game::new(
            Box::new(Scripted::new(Side::One, &[C, D, C, C, C])),
            Box::new(GrimTrigger::new(Side::Two)),
            5,
            None,
        )
        .unwrap();
        let rounds = game.run_all_rounds().await.unwrap();

        assert_eq!(moves(&rounds, Side::Two), vec![C, C, D, D, D]);
    }

    #[tokio::test]
    async fn test_cumulative_scores_replay() {
        let mut game = Game::new(
            Box::new(Scripted::new(Side::One, &[C, D, D, C, D, C])),
            Box::new(TitForTat::new(Side::Two)),
            6,
            Some(crate::payoff::MatrixType::Mixed30.matrix()),
        )
        .unwrap();
        game.run_all_rounds().await.unwrap();

        let (mut total1, mut total2) = (0.0, 0.0);
        for r in game.rounds() {
            let (s1, s2) = game.matrix().payoff(r.player1_move, r.player2_move);
            assert_eq!((s1, s2), (r.player1_score, r.player2_score));
            total1 += s1;
            total2 += s2;
            assert_eq!(r.cumulative_of(Side::One), total1);
            assert_eq!(r.cumulative_of(Side::Two), total2);
        }
        assert_eq!(game.scores(), (total1, total2));
    }

    #[tokio::test]
    async fn test_run_all_rounds_returns_only_new_rounds() {
        let mut game = Game::new(
            Box::new(AlwaysCooperate::new(Side::One)),
            Box::new(AlwaysDefect::new(Side::Two)),
            5,
            None,
        )
        .unwrap();
        game.process_round().await.unwrap();
        game.process_round().await.unwrap();

        let rest = game.run_all_rounds().await.unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].round_number, 3);
        assert_eq!(game.rounds().len(), 5);
    }

    #[tokio::test]
    async fn test_end_early_and_reset() {
        let mut game = Game::new(
            Box::new(Scripted::new(Side::One, &[D])),
            Box::new(GrimTrigger::new(Side::Two)),
            10,
            None,
        )
        .unwrap();
        game.process_round().await.unwrap();
        game.process_round().await.unwrap();
        game.end_early();

        assert!(game.is_game_over());
        assert_eq!(
            game.process_round().await.unwrap_err(),
            GameError::GameAlreadyOver { rounds_played: 2 }
        );

        game.reset();
        assert!(!game.is_game_over());
        assert_eq!(game.current_round(), 0);
        assert!(game.rounds().is_empty());
        assert_eq!(game.scores(), (0.0, 0.0));

        // Both seats start over: the script replays and grim is calm again
        let first = game.process_round().await.unwrap();
        assert_eq!((first.player1_move, first.player2_move), (D, C));
    }

    #[tokio::test]
    async fn test_record_requires_finished_game() {
        let mut game = Game::new(
            Box::new(AlwaysCooperate::new(Side::One)),
            Box::new(AlwaysDefect::new(Side::Two)),
            3,
            None,
        )
        .unwrap();
        game.process_round().await.unwrap();

        assert_eq!(
            game.record().unwrap_err(),
            GameError::GameInProgress {
                current_round: 1,
                max_rounds: 3
            }
        );

        game.run_all_rounds().await.unwrap();
        let record = game.record().unwrap();
        assert_eq!(record.game_id, game.id());
        assert_eq!(record.player2_kind, StrategyKind::AlwaysDefect);
        assert_eq!(record.final_scores, (0.0, 15.0));
        assert_eq!(record.num_rounds, 3);
        assert!(record.ai_summaries.is_empty());
    }

    #[tokio::test]
    async fn test_ai_rounds_carry_metadata() {
        let gateway = Arc::new(MockGateway::new(vec![
            reply("defect", 120),
            Err(crate::gateway::GatewayError::Timeout),
            Err(crate::gateway::GatewayError::Timeout),
            Err(crate::gateway::GatewayError::Timeout),
        ]));
        let ai = AiStrategy::new(
            Side::One,
            gateway,
            fast_settings(),
            &PayoffMatrix::classic(),
        );
        let mut game = Game::new(
            Box::new(ai),
            Box::new(AlwaysCooperate::new(Side::Two)),
            2,
            None,
        )
        .unwrap();

        let rounds = game.run_all_rounds().await.unwrap();

        let first = &rounds[0];
        assert_eq!(first.player1_move, D);
        assert_eq!(first.player1_reasoning, "because");
        let meta = first.ai_metadata.as_ref().unwrap();
        assert_eq!(meta.token_usage.total_tokens, 120);
        assert!(meta.api_error.is_none());

        let second = &rounds[1];
        assert_eq!(second.player1_move, C);
        assert!(second.player1_reasoning.starts_with("Fallback cooperation due to:"));
        let meta = second.ai_metadata.as_ref().unwrap();
        assert_eq!(meta.token_usage.total_tokens, 0);
        assert!(meta.api_error.as_deref().unwrap().contains("Failed after 3 attempts"));

        let record = game.record().unwrap();
        assert_eq!(record.ai_summaries.len(), 1);
        assert_eq!(record.ai_summaries[0].side, Side::One);
        assert_eq!(record.ai_summaries[0].total_tokens, 120);
        assert_eq!(record.ai_summaries[0].transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_state_snapshot_serializes() {
        let mut game = Game::new(
            Box::new(AlwaysCooperate::new(Side::One)),
            Box::new(AlwaysDefect::new(Side::Two)),
            3,
            None,
        )
        .unwrap();
        game.process_round().await.unwrap();

        let state = game.state();
        assert_eq!(state.current_round, 1);
        assert!(!state.is_game_over);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["rounds"][0]["player2_move"], "defect");
        assert_eq!(json["player2_strategy"], "Always Defect");
    }
}
