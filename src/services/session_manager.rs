//! Learning session orchestration.
//!
//! A session practices one statement through the 14 tricks in order. The
//! cursor only ever moves forward; `active` is the single non-terminal
//! state. At most one active session exists per user, enforced by the
//! lookup-then-create start path (a narrow race under concurrent starts from
//! the same user is accepted).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::db::operations::reminders;
use crate::db::operations::sessions::{self, NewResponse, SessionHistoryRow, SessionRow};
use crate::db::Database;
use crate::services::feedback::{self, Feedback};
use crate::services::progress_tracker::{ProgressError, ProgressTracker};
use crate::services::scoring::ScoringOracle;
use crate::services::statement_bank::{Difficulty, StatementBank};
use crate::services::trick_catalog::{
    CatalogError, TrickCatalog, DEFAULT_EXAMPLE_CONTEXT, TRICK_COUNT,
};

pub const DEFAULT_SESSION_TYPE: &str = "practice";
pub const STALE_SESSION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSession {
    pub id: i32,
    pub user_id: i64,
    pub statement_id: i32,
    pub session_type: String,
    pub status: SessionStatus,
    pub current_trick_index: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LearningSession {
    fn from_row(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            statement_id: row.statement_id,
            session_type: row.session_type,
            status: SessionStatus::parse(&row.status).unwrap_or(SessionStatus::Active),
            current_trick_index: row.current_trick_index,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Elapsed time: up to completion for terminal sessions, up to `now` for
    /// active ones. Timestamps are UTC at the storage boundary, so the
    /// subtraction is offset-safe by construction.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.completed_at.unwrap_or(now) - self.started_at
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub statement_id: i32,
    pub statement_text: String,
    pub statement_category: String,
    pub statement_difficulty: String,
    pub target_trick_id: i32,
    pub target_trick_name: String,
    pub target_trick_definition: String,
    pub examples: Vec<String>,
    pub attempt_number: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: i32,
    pub user_id: i64,
    pub duration_secs: i64,
    pub tricks_practiced: i64,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub average_score: f64,
    pub mastered_tricks: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(i32),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

pub struct SessionManager {
    db: Arc<Database>,
    catalog: Arc<TrickCatalog>,
    statements: Arc<StatementBank>,
    oracle: Arc<ScoringOracle>,
    progress: Arc<ProgressTracker>,
}

impl SessionManager {
    pub fn new(
        db: Arc<Database>,
        catalog: Arc<TrickCatalog>,
        statements: Arc<StatementBank>,
        oracle: Arc<ScoringOracle>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            db,
            catalog,
            statements,
            oracle,
            progress,
        }
    }

    /// Start a session, or hand back the existing active one unchanged.
    pub async fn start_session(&self, user_id: i64) -> Result<LearningSession, SessionError> {
        if let Some(existing) = self.active_session(user_id).await? {
            info!(user_id, session_id = existing.id, "User already has an active session");
            return Ok(existing);
        }

        let difficulty = self.get_adaptive_difficulty(user_id).await?;
        let statement = self.statements.random_statement(Some(difficulty)).await?;

        let row = sessions::insert_session(
            self.db.pool(),
            user_id,
            statement.id,
            DEFAULT_SESSION_TYPE,
        )
        .await?;
        let session = LearningSession::from_row(row);

        info!(
            user_id,
            session_id = session.id,
            statement_id = statement.id,
            difficulty = difficulty.as_str(),
            "Started new learning session"
        );
        Ok(session)
    }

    pub async fn resume_session(
        &self,
        user_id: i64,
    ) -> Result<Option<LearningSession>, SessionError> {
        self.active_session(user_id).await
    }

    pub async fn active_session(
        &self,
        user_id: i64,
    ) -> Result<Option<LearningSession>, SessionError> {
        let row = sessions::fetch_active_session(self.db.pool(), user_id).await?;
        Ok(row.map(LearningSession::from_row))
    }

    /// The next challenge, or `None` once the cursor has walked all 14
    /// tricks and the caller should complete the session.
    pub async fn get_next_challenge(
        &self,
        session: &LearningSession,
    ) -> Result<Option<Challenge>, SessionError> {
        let Some(next_trick_id) = next_trick_for_cursor(session.current_trick_index) else {
            return Ok(None);
        };

        let trick = self.catalog.get_trick(next_trick_id).await?;
        let statement = self.statements.get_statement(session.statement_id).await?;
        let examples = self
            .catalog
            .random_examples(next_trick_id, 2, DEFAULT_EXAMPLE_CONTEXT)
            .await?;
        let attempt_number = self.attempt_number(session.id, next_trick_id).await?;

        Ok(Some(Challenge {
            statement_id: statement.id,
            statement_text: statement.statement,
            statement_category: statement.category,
            statement_difficulty: statement.difficulty,
            target_trick_id: trick.id,
            target_trick_name: trick.name,
            target_trick_definition: trick.definition,
            examples,
            attempt_number,
        }))
    }

    async fn attempt_number(&self, session_id: i32, trick_id: i32) -> Result<i32, SessionError> {
        let prior =
            sessions::count_session_trick_responses(self.db.pool(), session_id, trick_id).await?;
        Ok(prior as i32 + 1)
    }

    /// Score a response, persist the attempt, fold it into progress, advance
    /// the cursor, and compose feedback for the caller.
    pub async fn process_user_response(
        &self,
        session: &mut LearningSession,
        response_text: &str,
        trick_id: i32,
    ) -> Result<Feedback, SessionError> {
        let trick = self.catalog.get_trick(trick_id).await?;
        let statement = self.statements.get_statement(session.statement_id).await?;
        let prompt_examples = self
            .catalog
            .random_examples(trick_id, 3, DEFAULT_EXAMPLE_CONTEXT)
            .await?;

        let analysis = self
            .oracle
            .analyze(response_text, &trick, &statement.statement, &prompt_examples)
            .await?;

        let attempt_number = self.attempt_number(session.id, trick_id).await?;

        sessions::insert_response(
            self.db.pool(),
            NewResponse {
                session_id: session.id,
                user_id: session.user_id,
                trick_id,
                statement_id: session.statement_id,
                user_response: response_text,
                ai_feedback: &analysis.feedback,
                similarity_score: analysis.score / 100.0,
                is_correct: analysis.is_correct,
                analysis_data: serde_json::to_value(&analysis)
                    .unwrap_or(serde_json::Value::Null),
            },
        )
        .await?;

        self.progress
            .update_progress(session.user_id, trick_id, analysis.score, analysis.is_correct)
            .await?;

        reminders::touch_practice(self.db.pool(), session.user_id, Utc::now()).await?;

        self.update_session_progress(session, trick_id).await?;

        let feedback_examples = self
            .catalog
            .random_examples(trick_id, 2, DEFAULT_EXAMPLE_CONTEXT)
            .await?;

        info!(
            user_id = session.user_id,
            session_id = session.id,
            trick_id,
            score = analysis.score,
            fallback = analysis.fallback_used,
            "Processed user response"
        );

        Ok(Feedback {
            encouragement: feedback::encouragement(analysis.score, attempt_number, &trick.name),
            examples: feedback_examples,
            tips: feedback::tips_for(trick_id),
            next_steps: feedback::next_steps(analysis.score),
            analysis,
        })
    }

    /// Advance the cursor to at least `completed_trick_id`; it never moves
    /// backwards regardless of the order trick ids arrive in.
    pub async fn update_session_progress(
        &self,
        session: &mut LearningSession,
        completed_trick_id: i32,
    ) -> Result<(), SessionError> {
        let new_index = advance_cursor(session.current_trick_index, completed_trick_id);
        if new_index != session.current_trick_index {
            sessions::update_cursor(self.db.pool(), session.id, new_index).await?;
            session.current_trick_index = new_index;
        }
        Ok(())
    }

    pub async fn complete_session(
        &self,
        session: &mut LearningSession,
    ) -> Result<SessionSummary, SessionError> {
        let pool = self.db.pool();

        let completed_at = sessions::mark_completed(pool, session.id).await?;
        session.status = SessionStatus::Completed;
        session.completed_at = Some(completed_at);

        let stats = sessions::fetch_session_stats(pool, session.id).await?;
        let mastered_tricks = sessions::fetch_session_mastered_tricks(pool, session.id).await?;

        let mut recommendations = session_recommendations(
            stats.average_score,
            stats.correct_attempts,
            stats.total_attempts,
        );
        for rec in self
            .progress
            .get_learning_recommendations(session.user_id)
            .await?
            .into_iter()
            .take(2)
        {
            recommendations.push(format!("Practice '{}': {}", rec.trick_name, rec.reason));
        }

        let summary = SessionSummary {
            session_id: session.id,
            user_id: session.user_id,
            duration_secs: session.duration(completed_at).num_seconds().max(0),
            tricks_practiced: stats.tricks_practiced,
            total_attempts: stats.total_attempts,
            correct_attempts: stats.correct_attempts,
            average_score: stats.average_score,
            mastered_tricks,
            recommendations,
        };

        info!(
            user_id = session.user_id,
            session_id = session.id,
            tricks_practiced = summary.tricks_practiced,
            average_score = summary.average_score,
            "Completed learning session"
        );
        Ok(summary)
    }

    pub async fn abandon_session(
        &self,
        session: &mut LearningSession,
    ) -> Result<(), SessionError> {
        sessions::mark_abandoned(self.db.pool(), session.id).await?;
        session.status = SessionStatus::Abandoned;
        info!(
            user_id = session.user_id,
            session_id = session.id,
            "Abandoned learning session"
        );
        Ok(())
    }

    /// Difficulty for the next session from the user's average mastery.
    pub async fn get_adaptive_difficulty(&self, user_id: i64) -> Result<Difficulty, SessionError> {
        let overall = self.progress.calculate_overall_progress(user_id).await?;
        Ok(adaptive_difficulty(overall.average_mastery))
    }

    pub async fn session_history(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<SessionHistoryRow>, SessionError> {
        Ok(sessions::fetch_session_history(self.db.pool(), user_id, limit).await?)
    }

    /// Abandons active sessions older than `max_age_days`. Returns how many
    /// were flipped.
    pub async fn cleanup_stale_sessions(&self, max_age_days: i64) -> Result<i64, SessionError> {
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let count = sessions::abandon_stale_sessions(self.db.pool(), cutoff).await?;
        if count > 0 {
            info!(count, max_age_days, "Cleaned up stale sessions");
        }
        Ok(count)
    }
}

/// `None` once the cursor has consumed all 14 tricks, otherwise the next
/// trick id (`cursor + 1`).
pub fn next_trick_for_cursor(cursor: i32) -> Option<i32> {
    if cursor >= TRICK_COUNT {
        None
    } else {
        Some(cursor.max(0) + 1)
    }
}

pub fn advance_cursor(current: i32, completed_trick_id: i32) -> i32 {
    current.max(completed_trick_id)
}

pub fn adaptive_difficulty(average_mastery: f64) -> Difficulty {
    if average_mastery >= 70.0 {
        Difficulty::Hard
    } else if average_mastery >= 40.0 {
        Difficulty::Medium
    } else {
        Difficulty::Easy
    }
}

fn session_recommendations(
    average_score: f64,
    correct_attempts: i64,
    total_attempts: i64,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if average_score >= 80.0 {
        recommendations.push("Excellent work! You are ready for harder statements.".to_string());
    } else if average_score >= 60.0 {
        recommendations.push("Good progress! Keep practicing to consolidate.".to_string());
    } else {
        recommendations
            .push("Review the definitions and examples before the next session.".to_string());
    }

    let success_rate = if total_attempts > 0 {
        correct_attempts as f64 / total_attempts as f64 * 100.0
    } else {
        0.0
    };
    if total_attempts > 0 && success_rate < 50.0 {
        recommendations.push("Focus on each technique's keywords.".to_string());
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_walks_tricks_one_to_fourteen() {
        assert_eq!(next_trick_for_cursor(0), Some(1));
        assert_eq!(next_trick_for_cursor(13), Some(14));
        assert_eq!(next_trick_for_cursor(14), None);
        assert_eq!(next_trick_for_cursor(20), None);
    }

    #[test]
    fn cursor_never_regresses() {
        let mut cursor = 0;
        for trick_id in [3, 1, 7, 2, 7, 14, 5] {
            let next = advance_cursor(cursor, trick_id);
            assert!(next >= cursor);
            cursor = next;
        }
        assert_eq!(cursor, 14);
    }

    #[test]
    fn difficulty_thresholds() {
        assert_eq!(adaptive_difficulty(0.0), Difficulty::Easy);
        assert_eq!(adaptive_difficulty(39.9), Difficulty::Easy);
        assert_eq!(adaptive_difficulty(40.0), Difficulty::Medium);
        assert_eq!(adaptive_difficulty(69.9), Difficulty::Medium);
        assert_eq!(adaptive_difficulty(70.0), Difficulty::Hard);
    }

    #[test]
    fn status_round_trips_and_terminality() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Abandoned,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
    }

    #[test]
    fn duration_uses_completion_when_terminal() {
        let started = Utc::now();
        let session = LearningSession {
            id: 1,
            user_id: 1,
            statement_id: 1,
            session_type: DEFAULT_SESSION_TYPE.to_string(),
            status: SessionStatus::Completed,
            current_trick_index: 14,
            started_at: started,
            completed_at: Some(started + Duration::seconds(90)),
        };
        let much_later = started + Duration::seconds(10_000);
        assert_eq!(session.duration(much_later).num_seconds(), 90);
    }

    #[test]
    fn duration_of_active_session_tracks_now() {
        let started = Utc::now();
        let session = LearningSession {
            id: 1,
            user_id: 1,
            statement_id: 1,
            session_type: DEFAULT_SESSION_TYPE.to_string(),
            status: SessionStatus::Active,
            current_trick_index: 0,
            started_at: started,
            completed_at: None,
        };
        assert_eq!(
            session.duration(started + Duration::seconds(30)).num_seconds(),
            30
        );
    }

    #[test]
    fn low_success_rate_adds_keyword_hint() {
        let recs = session_recommendations(45.0, 1, 10);
        assert_eq!(recs.len(), 2);
        assert!(recs[1].contains("keywords"));
    }

    #[test]
    fn high_score_recommends_harder_statements() {
        let recs = session_recommendations(85.0, 9, 10);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("harder"));
    }
}
