//! Experiment metrics

use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;
use crate::experiment::GameResult;
use crate::game::RoundResult;
use crate::payoff::PayoffMatrix;

/// Aggregates over every game in an experiment, from the subject's seat
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetrics {
    /// Mean per-game cooperation rate (both players' moves)
    pub cooperation_rate: f64,
    /// Mean shortfall of the subject's per-round score against the matrix
    /// optimum; `None` when the matrix carries no annotation
    pub points_below_optimal: Option<f64>,
    /// Late-half minus early-half mean cooperation rate
    pub learning_rate: f64,
    /// Mean subject final score
    pub avg_score: f64,
    pub total_rounds: u32,
}

/// Fraction of all moves in `rounds` that were cooperative
pub fn cooperation_rate(rounds: &[RoundResult]) -> f64 {
    if rounds.is_empty() {
        return 0.0;
    }
    let cooperations: usize = rounds.iter().map(RoundResult::cooperations).sum();
    cooperations as f64 / (2 * rounds.len()) as f64
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

pub fn compute_metrics(
    games: &[GameResult],
    matrix: &PayoffMatrix,
) -> Result<ExperimentMetrics, ExperimentError> {
    if games.is_empty() {
        return Err(ExperimentError::NoGamesToAnalyze);
    }

    let cooperation = mean(games.iter().map(|g| g.cooperation_rate));

    let points_below_optimal = matrix.optimal().map(|optimal| {
        let target = optimal.expected_score_per_round.0;
        mean(games.iter().map(|g| {
            let per_round = if g.total_rounds == 0 {
                0.0
            } else {
                g.final_scores.0 / g.total_rounds as f64
            };
            target - per_round
        }))
    });

    let learning_rate = if games.len() < 2 {
        0.0
    } else {
        let (early, late) = games.split_at(games.len() / 2);
        mean(late.iter().map(|g| g.cooperation_rate))
            - mean(early.iter().map(|g| g.cooperation_rate))
    };

    Ok(ExperimentMetrics {
        cooperation_rate: cooperation,
        points_below_optimal,
        learning_rate,
        avg_score: mean(games.iter().map(|g| g.final_scores.0)),
        total_rounds: games.iter().map(|g| g.total_rounds).sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payoff::MatrixType;
    use crate::strategy::StrategyKind;

    fn game(cooperation_rate: f64, subject_score: f64, total_rounds: u32) -> GameResult {
        GameResult {
            game_id: "game-test".to_string(),
            game_number: 1,
            opponent: StrategyKind::AlwaysDefect,
            rounds: Vec::new(),
            final_scores: (subject_score, 0.0),
            cooperation_rate,
            total_rounds,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let err = compute_metrics(&[], &PayoffMatrix::classic()).unwrap_err();
        assert!(matches!(err, ExperimentError::NoGamesToAnalyze));
    }

    #[test]
    fn test_cooperation_rate_averages_games() {
        let games = vec![game(1.0, 30.0, 10), game(0.0, 10.0, 10)];
        let metrics = compute_metrics(&games, &MatrixType::Baseline.matrix()).unwrap();

        assert!(approx(metrics.cooperation_rate, 0.5));
        assert!(approx(metrics.avg_score, 20.0));
        assert_eq!(metrics.total_rounds, 20);
        // Cooperation fell from the first half to the second
        assert!(approx(metrics.learning_rate, -1.0));
    }

    #[test]
    fn test_points_below_optimal() {
        // Baseline optimum is 1 point per round
        let games = vec![game(0.0, 10.0, 10), game(0.0, 5.0, 10)];
        let metrics = compute_metrics(&games, &MatrixType::Baseline.matrix()).unwrap();
        assert!(approx(metrics.points_below_optimal.unwrap(), 0.25));

        let metrics = compute_metrics(&games, &PayoffMatrix::classic()).unwrap();
        assert!(metrics.points_below_optimal.is_none());
    }

    #[test]
    fn test_learning_rate_single_game() {
        let metrics = compute_metrics(&[game(0.8, 24.0, 10)], &PayoffMatrix::classic()).unwrap();
        assert_eq!(metrics.learning_rate, 0.0);
    }

    #[test]
    fn test_learning_rate_odd_split() {
        // Early half: [0.0], late half: [0.5, 1.0]
        let games = vec![game(0.0, 0.0, 1), game(0.5, 0.0, 1), game(1.0, 0.0, 1)];
        let metrics = compute_metrics(&games, &PayoffMatrix::classic()).unwrap();
        assert!(approx(metrics.learning_rate, 0.75));
    }

    #[test]
    fn test_round_cooperation_rate() {
        use crate::strategy::tests::round;
        use crate::strategy::Move::{Cooperate as C, Defect as D};

        let rounds = vec![round(1, C, C), round(2, C, D)];
        assert!(approx(cooperation_rate(&rounds), 0.75));
        assert_eq!(cooperation_rate(&[]), 0.0);
    }
}
