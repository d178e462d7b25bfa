//! Property tests for the mastery update law and its counters.

use proptest::prelude::*;

use lang_tricks_backend::services::progress_tracker::{initial_mastery, next_mastery};

#[derive(Debug, Clone, Copy)]
struct Attempt {
    score: f64,
    is_correct: bool,
}

fn attempt_strategy() -> impl Strategy<Value = Attempt> {
    (0.0f64..=100.0, any::<bool>()).prop_map(|(score, is_correct)| Attempt { score, is_correct })
}

proptest! {
    #[test]
    fn mastery_stays_within_bounds_for_any_sequence(
        attempts in prop::collection::vec(attempt_strategy(), 1..50)
    ) {
        let mut mastery: Option<i32> = None;
        let mut total = 0i32;
        let mut correct = 0i32;

        for attempt in attempts {
            mastery = Some(match mastery {
                None => initial_mastery(attempt.score),
                Some(current) => next_mastery(current, attempt.score),
            });
            total += 1;
            if attempt.is_correct {
                correct += 1;
            }

            let level = mastery.unwrap();
            prop_assert!((0..=100).contains(&level));
            prop_assert!(correct <= total);
        }
    }

    #[test]
    fn repeated_perfect_scores_converge_upward(start in 0i32..=100) {
        let mut mastery = start;
        for _ in 0..50 {
            let next = next_mastery(mastery, 100.0);
            prop_assert!(next >= mastery);
            mastery = next;
        }
        prop_assert!(mastery >= 99);
    }

    #[test]
    fn repeated_zero_scores_converge_downward(start in 0i32..=100) {
        let mut mastery = start;
        for _ in 0..50 {
            let next = next_mastery(mastery, 0.0);
            prop_assert!(next <= mastery);
            mastery = next;
        }
        prop_assert!(mastery <= 1);
    }

    #[test]
    fn single_update_moves_at_most_thirty_points(current in 0i32..=100, score in 0.0f64..=100.0) {
        let next = next_mastery(current, score);
        prop_assert!((next - current).abs() <= 31);
    }
}
