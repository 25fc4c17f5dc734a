//! Payoff matrices
//!
//! A matrix maps each ordered `(own, opponent)` move pair to a payoff pair.
//! Payoffs are real-valued so negative and fractional games are expressible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PayoffError};
use crate::strategy::Move;

/// Game-theoretic optimum annotated on a matrix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimalStrategy {
    /// Probability of cooperating each round, in [0, 1]
    pub cooperation_rate: f64,
    /// Expected (player1, player2) score per round when both play optimally
    pub expected_score_per_round: (f64, f64),
    pub description: String,
}

/// One cell of a matrix
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoffEntry {
    pub own: Move,
    pub opponent: Move,
    pub payoffs: (f64, f64),
}

impl PayoffEntry {
    pub fn new(own: Move, opponent: Move, payoffs: (f64, f64)) -> Self {
        Self {
            own,
            opponent,
            payoffs,
        }
    }
}

/// Total mapping from move pairs to payoffs
///
/// Always holds exactly four cells; construction and deserialization
/// reject anything partial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix", into = "RawMatrix")]
pub struct PayoffMatrix {
    table: [[(f64, f64); 2]; 2],
    optimal: Option<OptimalStrategy>,
}

impl PayoffMatrix {
    /// Build from the four cells: both cooperate, I cooperate and they
    /// defect, I defect and they cooperate, both defect.
    pub fn new(cc: (f64, f64), cd: (f64, f64), dc: (f64, f64), dd: (f64, f64)) -> Self {
        Self {
            table: [[cc, cd], [dc, dd]],
            optimal: None,
        }
    }

    /// Classic Prisoner's Dilemma
    /// - Both cooperate: 3, 3
    /// - Cooperate vs defect: 0, 5
    /// - Defect vs cooperate: 5, 0
    /// - Both defect: 1, 1
    pub fn classic() -> Self {
        Self::new((3.0, 3.0), (0.0, 5.0), (5.0, 0.0), (1.0, 1.0))
    }

    /// Build from explicit cells, requiring each of the four combinations
    /// exactly once.
    pub fn from_entries<I>(entries: I) -> Result<Self, PayoffError>
    where
        I: IntoIterator<Item = PayoffEntry>,
    {
        let mut cells: [[Option<(f64, f64)>; 2]; 2] = [[None; 2]; 2];

        for entry in entries {
            if !entry.payoffs.0.is_finite() || !entry.payoffs.1.is_finite() {
                return Err(invalid(entry.own, entry.opponent, "payoffs must be finite"));
            }

            let cell = &mut cells[entry.own.index()][entry.opponent.index()];
            if cell.is_some() {
                return Err(invalid(entry.own, entry.opponent, "duplicate entry"));
            }
            *cell = Some(entry.payoffs);
        }

        let mut table = [[(0.0, 0.0); 2]; 2];
        for own in [Move::Cooperate, Move::Defect] {
            for opponent in [Move::Cooperate, Move::Defect] {
                table[own.index()][opponent.index()] = cells[own.index()][opponent.index()]
                    .ok_or_else(|| invalid(own, opponent, "missing entry"))?;
            }
        }

        Ok(Self {
            table,
            optimal: None,
        })
    }

    /// Attach an optimal-strategy annotation
    pub fn with_optimal(mut self, optimal: OptimalStrategy) -> Result<Self, PayoffError> {
        if !(0.0..=1.0).contains(&optimal.cooperation_rate) {
            return Err(PayoffError::InvalidOptimalRate(optimal.cooperation_rate));
        }
        self.optimal = Some(optimal);
        Ok(self)
    }

    /// Payoffs for `(own, opponent)` as `(own_score, opponent_score)`
    pub fn payoff(&self, own: Move, opponent: Move) -> (f64, f64) {
        self.table[own.index()][opponent.index()]
    }

    /// Look up payoffs by move names, as read from external input
    pub fn lookup(&self, own: &str, opponent: &str) -> Result<(f64, f64), PayoffError> {
        let parsed = own
            .parse::<Move>()
            .and_then(|o| opponent.parse::<Move>().map(|p| (o, p)));

        match parsed {
            Ok((own, opponent)) => Ok(self.payoff(own, opponent)),
            Err(e) => Err(PayoffError::InvalidCombination {
                own: own.to_string(),
                opponent: opponent.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// All four cells in CC, CD, DC, DD order
    pub fn entries(&self) -> [PayoffEntry; 4] {
        let cell =
            |own: Move, opponent: Move| PayoffEntry::new(own, opponent, self.payoff(own, opponent));
        [
            cell(Move::Cooperate, Move::Cooperate),
            cell(Move::Cooperate, Move::Defect),
            cell(Move::Defect, Move::Cooperate),
            cell(Move::Defect, Move::Defect),
        ]
    }

    pub fn optimal(&self) -> Option<&OptimalStrategy> {
        self.optimal.as_ref()
    }

    /// Cooperation probability that leaves the opponent indifferent between
    /// moves, `(S - P) / ((T - R) + (S - P))`, computed from player 1's payoffs.
    ///
    /// `None` when the denominator vanishes.
    pub fn indifference_rate(&self) -> Option<f64> {
        let reward = self.payoff(Move::Cooperate, Move::Cooperate).0;
        let sucker = self.payoff(Move::Cooperate, Move::Defect).0;
        let temptation = self.payoff(Move::Defect, Move::Cooperate).0;
        let punishment = self.payoff(Move::Defect, Move::Defect).0;

        let denominator = (temptation - reward) + (sucker - punishment);
        if denominator.abs() < f64::EPSILON {
            return None;
        }
        Some((sucker - punishment) / denominator)
    }

    /// Expected player 1 score per round when both sides cooperate with
    /// probability `p`
    pub fn expected_score(&self, p: f64) -> f64 {
        let q = 1.0 - p;
        let mut total = 0.0;
        for (own, own_p) in [(Move::Cooperate, p), (Move::Defect, q)] {
            for (opponent, opponent_p) in [(Move::Cooperate, p), (Move::Defect, q)] {
                total += own_p * opponent_p * self.payoff(own, opponent).0;
            }
        }
        total
    }
}

impl Default for PayoffMatrix {
    fn default() -> Self {
        Self::classic()
    }
}

fn invalid(own: Move, opponent: Move, reason: &str) -> PayoffError {
    PayoffError::InvalidCombination {
        own: own.to_string(),
        opponent: opponent.to_string(),
        reason: reason.to_string(),
    }
}

/// Wire form of a matrix. Moves stay as strings so a malformed entry is
/// reported as an invalid combination.
#[derive(Serialize, Deserialize)]
struct RawMatrix {
    entries: Vec<RawEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    optimal: Option<OptimalStrategy>,
}

#[derive(Serialize, Deserialize)]
struct RawEntry {
    own: String,
    opponent: String,
    payoffs: (f64, f64),
}

impl TryFrom<RawMatrix> for PayoffMatrix {
    type Error = PayoffError;

    fn try_from(raw: RawMatrix) -> Result<Self, Self::Error> {
        let entries = raw
            .entries
            .into_iter()
            .map(|e| {
                let own = e.own.parse::<Move>();
                let opponent = e.opponent.parse::<Move>();
                match (own, opponent) {
                    (Ok(own), Ok(opponent)) => Ok(PayoffEntry::new(own, opponent, e.payoffs)),
                    (Err(err), _) | (_, Err(err)) => Err(PayoffError::InvalidCombination {
                        own: e.own,
                        opponent: e.opponent,
                        reason: err.to_string(),
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let matrix = Self::from_entries(entries)?;
        match raw.optimal {
            Some(optimal) => matrix.with_optimal(optimal),
            None => Ok(matrix),
        }
    }
}

impl From<PayoffMatrix> for RawMatrix {
    fn from(matrix: PayoffMatrix) -> Self {
        RawMatrix {
            entries: matrix
                .entries()
                .iter()
                .map(|e| RawEntry {
                    own: e.own.to_string(),
                    opponent: e.opponent.to_string(),
                    payoffs: e.payoffs,
                })
                .collect(),
            optimal: matrix.optimal,
        }
    }
}

/// Built-in matrices, each annotated with its optimal strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixType {
    #[serde(rename = "baseline")]
    Baseline,
    #[serde(rename = "mixed_30")]
    Mixed30,
    #[serde(rename = "mixed_70")]
    Mixed70,
    #[serde(rename = "pure_defect")]
    PureDefect,
    #[serde(rename = "stag_hunt")]
    StagHunt,
}

impl MatrixType {
    pub fn all() -> &'static [MatrixType] {
        &[
            MatrixType::Baseline,
            MatrixType::Mixed30,
            MatrixType::Mixed70,
            MatrixType::PureDefect,
            MatrixType::StagHunt,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatrixType::Baseline => "baseline",
            MatrixType::Mixed30 => "mixed_30",
            MatrixType::Mixed70 => "mixed_70",
            MatrixType::PureDefect => "pure_defect",
            MatrixType::StagHunt => "stag_hunt",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MatrixType::Baseline => {
                "Classic Prisoner's Dilemma; mutual defection is the equilibrium"
            }
            MatrixType::Mixed30 => {
                "Harsh mutual defection; optimal play cooperates 30% of the time"
            }
            MatrixType::Mixed70 => {
                "Very harsh mutual defection; optimal play cooperates 70% of the time"
            }
            MatrixType::PureDefect => "Large temptation and sucker gap; always defect is optimal",
            MatrixType::StagHunt => "Cooperation pays best; always cooperate is optimal",
        }
    }

    /// The annotated matrix for this type
    pub fn matrix(&self) -> PayoffMatrix {
        let (cells, rate, expected) = match self {
            MatrixType::Baseline => ([(3.0, 3.0), (0.0, 5.0), (5.0, 0.0), (1.0, 1.0)], 0.0, 1.0),
            MatrixType::PureDefect => (
                [(2.0, 2.0), (-1.0, 6.0), (6.0, -1.0), (1.0, 1.0)],
                0.0,
                1.0,
            ),
            MatrixType::StagHunt => ([(4.0, 4.0), (0.0, 3.0), (3.0, 0.0), (2.0, 2.0)], 1.0, 4.0),
            MatrixType::Mixed30 => (
                [(3.0, 3.0), (0.0, 10.0), (10.0, 0.0), (-3.0, -3.0)],
                0.3,
                0.9,
            ),
            MatrixType::Mixed70 => ([(3.0, 3.0), (0.0, 6.0), (6.0, 0.0), (-7.0, -7.0)], 0.7, 2.1),
        };
        let [cc, cd, dc, dd] = cells;

        PayoffMatrix {
            table: [[cc, cd], [dc, dd]],
            optimal: Some(OptimalStrategy {
                cooperation_rate: rate,
                expected_score_per_round: (expected, expected),
                description: self.description().to_string(),
            }),
        }
    }
}

impl fmt::Display for MatrixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatrixType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatrixType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownMatrix(s.to_string()))
    }
}
