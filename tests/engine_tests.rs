//! Behavior tests over the engine's public surface that need no database:
//! the pure decision functions every persistent operation delegates to.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, TimeZone, Utc};

use lang_tricks_backend::services::feedback;
use lang_tricks_backend::services::progress_tracker::{
    initial_mastery, next_mastery, streak_from_dates,
};
use lang_tricks_backend::services::scoring::{
    classify_response, fallback_analysis, CORRECT_CONFIDENCE,
};
use lang_tricks_backend::services::session_manager::{
    adaptive_difficulty, advance_cursor, next_trick_for_cursor,
};
use lang_tricks_backend::services::statement_bank::Difficulty;
use lang_tricks_backend::services::trick_catalog::{LanguageTrick, TRICK_COUNT};
use lang_tricks_backend::workers::reminder::{
    is_reminder_eligible, seconds_until_trigger, REMINDER_MESSAGES,
};

fn trick(id: i32, name: &str, keywords: &[&str]) -> LanguageTrick {
    LanguageTrick {
        id,
        name: name.to_string(),
        definition: format!("{name} definition"),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        examples: HashMap::new(),
    }
}

#[test]
fn challenge_target_is_cursor_plus_one_until_exhausted() {
    for cursor in 0..TRICK_COUNT {
        assert_eq!(next_trick_for_cursor(cursor), Some(cursor + 1));
    }
    assert_eq!(next_trick_for_cursor(TRICK_COUNT), None);
}

#[test]
fn cursor_is_monotonic_under_out_of_order_updates() {
    let mut cursor = 0;
    let mut seen = vec![cursor];
    for trick_id in [2, 9, 4, 9, 1, 14, 3] {
        cursor = advance_cursor(cursor, trick_id);
        seen.push(cursor);
    }
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(cursor, 14);
}

#[test]
fn mastery_update_law_matches_reference_vectors() {
    assert_eq!(next_mastery(50, 100.0), 65);
    assert_eq!(next_mastery(0, 0.0), 0);
    assert_eq!(next_mastery(100, 0.0), 70);
}

#[test]
fn first_attempt_seeds_mastery_with_the_raw_score() {
    assert_eq!(initial_mastery(85.0), 85);
}

#[test]
fn streak_counts_three_consecutive_days() {
    let today = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
    let dates = vec![today, today - Duration::days(1), today - Duration::days(2)];
    assert_eq!(streak_from_dates(&dates, today), 3);
}

#[test]
fn streak_breaks_on_a_gap() {
    let today = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
    let dates = vec![today, today - Duration::days(2)];
    assert_eq!(streak_from_dates(&dates, today), 1);
}

#[test]
fn adaptive_difficulty_follows_average_mastery() {
    assert_eq!(adaptive_difficulty(75.0), Difficulty::Hard);
    assert_eq!(adaptive_difficulty(55.0), Difficulty::Medium);
    assert_eq!(adaptive_difficulty(10.0), Difficulty::Easy);
}

#[test]
fn disabled_users_are_never_eligible_for_reminders() {
    let cutoff = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let very_stale = Some(cutoff - Duration::days(365));
    assert!(!is_reminder_eligible(false, very_stale, very_stale, cutoff));
}

#[test]
fn practicing_today_excludes_a_user_never_reminded() {
    let cutoff = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let today = Some(cutoff + Duration::days(7));
    assert!(!is_reminder_eligible(true, today, None, cutoff));
}

#[test]
fn fully_stale_enabled_user_is_eligible() {
    let cutoff = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let stale = Some(cutoff - Duration::days(2));
    assert!(is_reminder_eligible(true, stale, None, cutoff));
    assert!(is_reminder_eligible(true, None, stale, cutoff));
    assert!(is_reminder_eligible(true, None, None, cutoff));
}

#[test]
fn daily_trigger_never_waits_more_than_a_day() {
    for hour in [0, 5, 11, 12, 13, 23] {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, hour, 17, 3).unwrap();
        let wait = seconds_until_trigger(now, 12);
        assert!(wait.as_secs() > 0);
        assert!(wait.as_secs() <= 24 * 3600);
    }
}

#[test]
fn reminder_messages_rotate_through_the_whole_table() {
    assert!(REMINDER_MESSAGES.len() > 1);
    let round: Vec<&str> = (0..REMINDER_MESSAGES.len())
        .map(|i| REMINDER_MESSAGES[i % REMINDER_MESSAGES.len()])
        .collect();
    let mut unique = round.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), REMINDER_MESSAGES.len());
}

#[test]
fn keyword_fallback_scores_on_target_overlap() {
    let tricks = vec![
        trick(1, "Intent", &["intent", "purpose", "really want"]),
        trick(12, "Counterexample", &["except", "not always", "remember when"]),
    ];

    let analysis = fallback_analysis(
        "But remember when it worked? It's not always like this, except on bad days",
        &tricks[1],
        &tricks,
    );
    assert!(analysis.is_correct);
    assert!(analysis.score >= CORRECT_CONFIDENCE);
    assert!(analysis.fallback_used);
}

#[test]
fn keyword_fallback_flags_a_mismatched_technique() {
    let tricks = vec![
        trick(1, "Intent", &["intent", "purpose", "really want"]),
        trick(12, "Counterexample", &["except", "not always", "remember when"]),
    ];

    let classification = classify_response(
        "But remember when it worked? Not always, except sometimes",
        &tricks[0],
        &tricks,
    );
    assert_eq!(classification.detected_trick_id, Some(12));
}

#[test]
fn feedback_banding_covers_the_score_range() {
    assert!(feedback::encouragement(90.0, 2, "Intent").contains("Excellent"));
    assert!(feedback::next_steps(90.0).contains("next technique"));
    assert!(feedback::next_steps(55.0).is_empty());
    assert!(!feedback::next_steps(10.0).is_empty());
}

#[test]
fn every_trick_id_gets_tips() {
    for trick_id in 1..=TRICK_COUNT {
        let tips = feedback::tips_for(trick_id);
        assert!(!tips.is_empty());
        assert!(tips.len() <= 3);
    }
}
