//! Property tests for game invariants

use dilemma_logic::{
    Game, MatrixType, Move, PayoffMatrix, Side, StrategyFactory, StrategyKind,
};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn matrix_type() -> impl Strategy<Value = MatrixType> {
    prop::sample::select(MatrixType::all().to_vec())
}

fn rule_based_kind() -> impl Strategy<Value = StrategyKind> {
    let kinds: Vec<_> = StrategyKind::all()
        .iter()
        .copied()
        .filter(|k| !k.is_ai())
        .collect();
    prop::sample::select(kinds)
}

fn any_move() -> impl Strategy<Value = Move> {
    prop_oneof![Just(Move::Cooperate), Just(Move::Defect)]
}

fn play(
    matrix_type: MatrixType,
    p1: StrategyKind,
    p2: StrategyKind,
    seed: u64,
    max_rounds: u32,
) -> Game {
    let factory = StrategyFactory::new(matrix_type.matrix()).with_seed(seed);
    let mut game = Game::new(
        factory.build(p1, Side::One).unwrap(),
        factory.build(p2, Side::Two).unwrap(),
        max_rounds,
        Some(matrix_type.matrix()),
    )
    .unwrap();

    runtime().block_on(game.run_all_rounds()).unwrap();
    game
}

proptest! {
    #[test]
    fn prop_scores_replay_from_rounds(
        matrix_type in matrix_type(),
        p1 in rule_based_kind(),
        p2 in rule_based_kind(),
        seed in any::<u64>(),
        max_rounds in 1u32..40,
    ) {
        let game = play(matrix_type, p1, p2, seed, max_rounds);

        let (mut total1, mut total2) = (0.0, 0.0);
        for r in game.rounds() {
            let (s1, s2) = game.matrix().payoff(r.player1_move, r.player2_move);
            prop_assert_eq!((s1, s2), (r.player1_score, r.player2_score));
            total1 += s1;
            total2 += s2;
            prop_assert_eq!(r.cumulative_player1_score, total1);
            prop_assert_eq!(r.cumulative_player2_score, total2);
        }
        prop_assert_eq!(game.scores(), (total1, total2));
    }

    #[test]
    fn prop_round_count_matches_log(
        p1 in rule_based_kind(),
        p2 in rule_based_kind(),
        seed in any::<u64>(),
        max_rounds in 1u32..40,
    ) {
        let game = play(MatrixType::Baseline, p1, p2, seed, max_rounds);

        prop_assert!(game.is_game_over());
        prop_assert_eq!(game.current_round(), max_rounds);
        prop_assert_eq!(game.rounds().len() as u32, game.current_round());
        for (i, r) in game.rounds().iter().enumerate() {
            prop_assert_eq!(r.round_number, i as u32 + 1);
        }
    }

    #[test]
    fn prop_payoff_lookup_is_total(own in any_move(), opponent in any_move(), upper in any::<bool>()) {
        let matrix = PayoffMatrix::classic();
        let name = |m: Move| if upper { m.to_string().to_uppercase() } else { m.to_string() };

        let by_name = matrix.lookup(&name(own), &name(opponent)).unwrap();
        prop_assert_eq!(by_name, matrix.payoff(own, opponent));

        // Payoffs are symmetric under seat swap for the classic game
        let (a, b) = matrix.payoff(own, opponent);
        prop_assert_eq!(matrix.payoff(opponent, own), (b, a));
    }

    #[test]
    fn prop_same_seed_same_game(
        matrix_type in matrix_type(),
        seed in any::<u64>(),
        max_rounds in 1u32..25,
    ) {
        let a = play(matrix_type, StrategyKind::Random, StrategyKind::Optimal, seed, max_rounds);
        let b = play(matrix_type, StrategyKind::Random, StrategyKind::Optimal, seed, max_rounds);

        let moves = |g: &Game| -> Vec<(Move, Move)> {
            g.rounds().iter().map(|r| (r.player1_move, r.player2_move)).collect()
        };
        prop_assert_eq!(moves(&a), moves(&b));
    }
}
