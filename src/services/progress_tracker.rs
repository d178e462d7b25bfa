//! Per-user, per-trick mastery tracking.
//!
//! `update_progress` is the single mutation path for `mastery_level`: a
//! 30%-weighted moving average that favors stability over single-attempt
//! swings. Everything else here is read-side projection: overall progress,
//! calendar-day streaks, recommendations and achievements.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::db::operations::{progress, sessions};
use crate::db::Database;
use crate::services::trick_catalog::{CatalogError, TrickCatalog, TRICK_COUNT};

pub use crate::db::operations::progress::UserProgress;

/// Mastery level at or above which a trick counts as mastered.
pub const MASTERY_THRESHOLD: i32 = 80;
/// Weight of the newest score in the mastery moving average.
pub const SCORE_WEIGHT: f64 = 0.3;
/// Days without practice after which a mid-mastery trick needs review.
pub const REVIEW_AFTER_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgress {
    pub user_id: i64,
    pub total_tricks: i32,
    pub practiced_tricks: i64,
    pub mastered_tricks: i64,
    pub average_mastery: f64,
    pub total_attempts: i64,
    pub total_correct: i64,
    pub learning_streak: i32,
    pub last_session: Option<DateTime<Utc>>,
}

impl OverallProgress {
    pub fn completion_percentage(&self) -> f64 {
        if self.total_tricks == 0 {
            return 0.0;
        }
        self.mastered_tricks as f64 / self.total_tricks as f64 * 100.0
    }

    pub fn overall_success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.total_correct as f64 / self.total_attempts as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    NewTrick,
    Practice,
    Review,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub trick_id: i32,
    pub trick_name: String,
    pub reason: String,
    /// 1 is the highest priority.
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub completed: bool,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStatistics {
    pub period_days: i64,
    pub active_days: i64,
    pub total_sessions: i64,
    pub avg_session_minutes: f64,
    pub total_responses: i64,
    pub correct_responses: i64,
    pub success_rate: f64,
    pub avg_similarity: f64,
    pub trick_performance: Vec<sessions::PeriodTrickStats>,
}

pub struct ProgressTracker {
    db: Arc<Database>,
    catalog: Arc<TrickCatalog>,
}

impl ProgressTracker {
    pub fn new(db: Arc<Database>, catalog: Arc<TrickCatalog>) -> Self {
        Self { db, catalog }
    }

    /// Record one scored attempt. First attempt seeds mastery with the raw
    /// score; later attempts blend through the moving average.
    pub async fn update_progress(
        &self,
        user_id: i64,
        trick_id: i32,
        score: f64,
        is_correct: bool,
    ) -> Result<(), ProgressError> {
        let pool = self.db.pool();

        match progress::fetch_progress(pool, user_id, trick_id).await? {
            Some(current) => {
                let new_mastery = next_mastery(current.mastery_level, score);
                let new_total = current.total_attempts + 1;
                let new_correct = current.correct_attempts + if is_correct { 1 } else { 0 };
                progress::update_progress_row(
                    pool, user_id, trick_id, new_mastery, new_total, new_correct,
                )
                .await?;
            }
            None => {
                progress::insert_progress(pool, user_id, trick_id, initial_mastery(score), is_correct)
                    .await?;
            }
        }

        info!(user_id, trick_id, score, is_correct, "Updated trick progress");
        Ok(())
    }

    pub async fn get_user_progress(&self, user_id: i64) -> Result<Vec<UserProgress>, ProgressError> {
        Ok(progress::fetch_user_progress(self.db.pool(), user_id).await?)
    }

    pub async fn get_progress_for_trick(
        &self,
        user_id: i64,
        trick_id: i32,
    ) -> Result<Option<UserProgress>, ProgressError> {
        Ok(progress::fetch_progress(self.db.pool(), user_id, trick_id).await?)
    }

    pub async fn mastery_level(&self, user_id: i64, trick_id: i32) -> Result<i32, ProgressError> {
        Ok(self
            .get_progress_for_trick(user_id, trick_id)
            .await?
            .map(|p| p.mastery_level)
            .unwrap_or(0))
    }

    pub async fn calculate_overall_progress(
        &self,
        user_id: i64,
    ) -> Result<OverallProgress, ProgressError> {
        let stats =
            progress::fetch_progress_stats(self.db.pool(), user_id, MASTERY_THRESHOLD).await?;
        let streak = self.learning_streak(user_id).await?;

        Ok(OverallProgress {
            user_id,
            total_tricks: TRICK_COUNT,
            practiced_tricks: stats.practiced_tricks,
            mastered_tricks: stats.mastered_tricks,
            average_mastery: stats.average_mastery,
            total_attempts: stats.total_attempts,
            total_correct: stats.total_correct,
            learning_streak: streak,
            last_session: stats.last_session,
        })
    }

    pub async fn learning_streak(&self, user_id: i64) -> Result<i32, ProgressError> {
        let dates = progress::fetch_practice_dates(self.db.pool(), user_id).await?;
        Ok(streak_from_dates(&dates, Utc::now().date_naive()))
    }

    /// Top-5 recommendations across all 14 tricks, highest priority first.
    pub async fn get_learning_recommendations(
        &self,
        user_id: i64,
    ) -> Result<Vec<Recommendation>, ProgressError> {
        let progress_list = self.get_user_progress(user_id).await?;
        let tricks = self.catalog.all_tricks().await?;
        let progress_map: HashMap<i32, &UserProgress> =
            progress_list.iter().map(|p| (p.trick_id, p)).collect();

        let now = Utc::now();
        let mut recommendations = Vec::new();

        for trick in tricks.iter() {
            let entry = progress_map.get(&trick.id).copied();
            if let Some((kind, priority, reason)) = classify_recommendation(entry, now) {
                recommendations.push(Recommendation {
                    kind,
                    trick_id: trick.id,
                    trick_name: trick.name.clone(),
                    reason,
                    priority,
                });
            }
        }

        recommendations.sort_by_key(|r| (r.priority, r.trick_id));
        recommendations.truncate(5);
        Ok(recommendations)
    }

    pub async fn get_achievement_progress(
        &self,
        user_id: i64,
    ) -> Result<Vec<Achievement>, ProgressError> {
        let overall = self.calculate_overall_progress(user_id).await?;
        Ok(achievements_from(&overall))
    }

    pub async fn learning_statistics(
        &self,
        user_id: i64,
        days: i64,
    ) -> Result<LearningStatistics, ProgressError> {
        let pool = self.db.pool();
        let cutoff = Utc::now() - Duration::days(days);

        let session_stats = sessions::fetch_period_session_stats(pool, user_id, cutoff).await?;
        let response_stats = sessions::fetch_period_response_stats(pool, user_id, cutoff).await?;
        let trick_performance = sessions::fetch_period_trick_stats(pool, user_id, cutoff).await?;

        let success_rate = if response_stats.total_responses > 0 {
            response_stats.correct_responses as f64 / response_stats.total_responses as f64 * 100.0
        } else {
            0.0
        };

        Ok(LearningStatistics {
            period_days: days,
            active_days: session_stats.active_days,
            total_sessions: session_stats.total_sessions,
            avg_session_minutes: session_stats.avg_session_minutes,
            total_responses: response_stats.total_responses,
            correct_responses: response_stats.correct_responses,
            success_rate,
            avg_similarity: response_stats.avg_similarity,
            trick_performance,
        })
    }
}

/// Mastery update law: new = round(clamp(0, 100, 0.7 * old + 0.3 * score)).
pub fn next_mastery(current: i32, score: f64) -> i32 {
    let blended = current as f64 * (1.0 - SCORE_WEIGHT) + score * SCORE_WEIGHT;
    blended.clamp(0.0, 100.0).round() as i32
}

pub fn initial_mastery(score: f64) -> i32 {
    score.clamp(0.0, 100.0).round() as i32
}

/// Consecutive practice days, walking distinct dates backwards from `today`.
/// The current day may still be pending: a run starting yesterday counts.
pub fn streak_from_dates(dates_desc: &[NaiveDate], today: NaiveDate) -> i32 {
    let mut streak = 0;
    let mut expected = today;

    for &date in dates_desc {
        if date == expected {
            streak += 1;
            expected = date - Duration::days(1);
        } else if streak == 0 && date == expected - Duration::days(1) {
            streak += 1;
            expected = date - Duration::days(1);
        } else {
            break;
        }
    }

    streak
}

fn classify_recommendation(
    entry: Option<&UserProgress>,
    now: DateTime<Utc>,
) -> Option<(RecommendationKind, i32, String)> {
    let Some(progress) = entry else {
        return Some((
            RecommendationKind::NewTrick,
            2,
            "A technique you have not tried yet".to_string(),
        ));
    };

    if progress.mastery_level < 50 {
        return Some((
            RecommendationKind::Practice,
            1,
            format!("Low mastery ({}%)", progress.mastery_level),
        ));
    }

    if progress.mastery_level < MASTERY_THRESHOLD {
        if let Some(last) = progress.last_practiced {
            let days_since = (now - last).num_days();
            if days_since > REVIEW_AFTER_DAYS {
                return Some((
                    RecommendationKind::Review,
                    3,
                    format!("Not practiced for {days_since} days"),
                ));
            }
        }
    }

    None
}

pub fn achievements_from(overall: &OverallProgress) -> Vec<Achievement> {
    vec![
        Achievement {
            key: "first_steps",
            name: "First Steps",
            description: "Try your first technique",
            completed: overall.practiced_tricks > 0,
            progress: overall.practiced_tricks.min(1) as f64,
        },
        Achievement {
            key: "dedicated_learner",
            name: "Dedicated Learner",
            description: "Practice 7 days in a row",
            completed: overall.learning_streak >= 7,
            progress: overall.learning_streak.min(7) as f64,
        },
        Achievement {
            key: "trick_master",
            name: "Technique Master",
            description: "Master 5 techniques",
            completed: overall.mastered_tricks >= 5,
            progress: overall.mastered_tricks.min(5) as f64,
        },
        Achievement {
            key: "perfectionist",
            name: "Perfectionist",
            description: "Reach 90% accuracy",
            completed: overall.overall_success_rate() >= 90.0,
            progress: overall.overall_success_rate().min(90.0),
        },
        Achievement {
            key: "language_guru",
            name: "Language Guru",
            description: "Master all 14 techniques",
            completed: overall.mastered_tricks >= 14,
            progress: overall.mastered_tricks.min(14) as f64,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_entry(mastery: i32, last_practiced_days_ago: i64) -> UserProgress {
        let now = Utc::now();
        UserProgress {
            user_id: 1,
            trick_id: 1,
            mastery_level: mastery,
            total_attempts: 4,
            correct_attempts: 2,
            last_practiced: Some(now - Duration::days(last_practiced_days_ago)),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn mastery_update_law_reference_points() {
        assert_eq!(next_mastery(50, 100.0), 65);
        assert_eq!(next_mastery(0, 0.0), 0);
        assert_eq!(next_mastery(100, 0.0), 70);
    }

    #[test]
    fn mastery_stays_in_bounds() {
        assert_eq!(next_mastery(100, 100.0), 100);
        assert_eq!(next_mastery(0, -50.0), 0);
        assert_eq!(next_mastery(95, 500.0), 100);
    }

    #[test]
    fn initial_mastery_rounds_and_clamps() {
        assert_eq!(initial_mastery(84.6), 85);
        assert_eq!(initial_mastery(150.0), 100);
        assert_eq!(initial_mastery(-3.0), 0);
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let dates = vec![
            today,
            today - Duration::days(1),
            today - Duration::days(2),
        ];
        assert_eq!(streak_from_dates(&dates, today), 3);
    }

    #[test]
    fn streak_stops_at_first_gap() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let dates = vec![today, today - Duration::days(2)];
        assert_eq!(streak_from_dates(&dates, today), 1);
    }

    #[test]
    fn streak_allows_pending_today() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let dates = vec![
            today - Duration::days(1),
            today - Duration::days(2),
            today - Duration::days(3),
        ];
        assert_eq!(streak_from_dates(&dates, today), 3);
    }

    #[test]
    fn streak_of_empty_history_is_zero() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert_eq!(streak_from_dates(&[], today), 0);
    }

    #[test]
    fn streak_ignores_old_isolated_practice() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let dates = vec![today - Duration::days(5)];
        assert_eq!(streak_from_dates(&dates, today), 0);
    }

    #[test]
    fn unpracticed_trick_is_recommended_as_new() {
        let (kind, priority, _) = classify_recommendation(None, Utc::now()).unwrap();
        assert_eq!(kind, RecommendationKind::NewTrick);
        assert_eq!(priority, 2);
    }

    #[test]
    fn low_mastery_outranks_new_tricks() {
        let entry = progress_entry(30, 1);
        let (kind, priority, _) = classify_recommendation(Some(&entry), Utc::now()).unwrap();
        assert_eq!(kind, RecommendationKind::Practice);
        assert_eq!(priority, 1);
    }

    #[test]
    fn stale_mid_mastery_needs_review() {
        let entry = progress_entry(65, 10);
        let (kind, priority, _) = classify_recommendation(Some(&entry), Utc::now()).unwrap();
        assert_eq!(kind, RecommendationKind::Review);
        assert_eq!(priority, 3);
    }

    #[test]
    fn fresh_mid_mastery_needs_nothing() {
        let entry = progress_entry(65, 2);
        assert!(classify_recommendation(Some(&entry), Utc::now()).is_none());
    }

    #[test]
    fn mastered_trick_needs_nothing() {
        let entry = progress_entry(90, 30);
        assert!(classify_recommendation(Some(&entry), Utc::now()).is_none());
    }

    #[test]
    fn achievements_reflect_overall_progress() {
        let overall = OverallProgress {
            user_id: 1,
            total_tricks: 14,
            practiced_tricks: 14,
            mastered_tricks: 14,
            average_mastery: 92.0,
            total_attempts: 100,
            total_correct: 95,
            learning_streak: 10,
            last_session: None,
        };
        let achievements = achievements_from(&overall);
        assert!(achievements.iter().all(|a| a.completed));
    }

    #[test]
    fn achievements_progress_is_bounded() {
        let overall = OverallProgress {
            user_id: 1,
            total_tricks: 14,
            practiced_tricks: 0,
            mastered_tricks: 0,
            average_mastery: 0.0,
            total_attempts: 0,
            total_correct: 0,
            learning_streak: 0,
            last_session: None,
        };
        let achievements = achievements_from(&overall);
        assert!(achievements.iter().all(|a| !a.completed));
        assert!(achievements.iter().all(|a| a.progress >= 0.0));
    }
}
