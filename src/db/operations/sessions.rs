use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: i32,
    pub user_id: i64,
    pub statement_id: i32,
    pub session_type: String,
    pub status: String,
    pub current_trick_index: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewResponse<'a> {
    pub session_id: i32,
    pub user_id: i64,
    pub trick_id: i32,
    pub statement_id: i32,
    pub user_response: &'a str,
    pub ai_feedback: &'a str,
    /// Normalized to 0..1 at the storage boundary.
    pub similarity_score: f64,
    pub is_correct: bool,
    pub analysis_data: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub tricks_practiced: i64,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryRow {
    pub session_id: i32,
    pub session_type: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub statement: String,
    pub difficulty: String,
    pub responses_count: i64,
    pub correct_count: i64,
    pub average_score: f64,
}

fn map_session_row(row: &PgRow) -> Result<SessionRow, sqlx::Error> {
    Ok(SessionRow {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        statement_id: row.try_get("statement_id")?,
        session_type: row.try_get("session_type")?,
        status: row.try_get("status")?,
        current_trick_index: row.try_get("current_trick_index")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

pub async fn fetch_active_session(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<SessionRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "user_id", "statement_id", "session_type", "status",
               "current_trick_index", "started_at", "completed_at"
        FROM "learning_sessions"
        WHERE "user_id" = $1 AND "status" = 'active'
        ORDER BY "started_at" DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_session_row).transpose()
}

pub async fn insert_session(
    pool: &PgPool,
    user_id: i64,
    statement_id: i32,
    session_type: &str,
) -> Result<SessionRow, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO "learning_sessions"
            ("user_id", "statement_id", "session_type", "status", "current_trick_index")
        VALUES ($1, $2, $3, 'active', 0)
        RETURNING "id", "user_id", "statement_id", "session_type", "status",
                  "current_trick_index", "started_at", "completed_at"
        "#,
    )
    .bind(user_id)
    .bind(statement_id)
    .bind(session_type)
    .fetch_one(pool)
    .await?;

    map_session_row(&row)
}

pub async fn update_cursor(
    pool: &PgPool,
    session_id: i32,
    new_index: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "learning_sessions"
        SET "current_trick_index" = $1
        WHERE "id" = $2
        "#,
    )
    .bind(new_index)
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn mark_completed(
    pool: &PgPool,
    session_id: i32,
) -> Result<DateTime<Utc>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE "learning_sessions"
        SET "status" = 'completed', "completed_at" = NOW()
        WHERE "id" = $1
        RETURNING "completed_at"
        "#,
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    row.try_get("completed_at")
}

pub async fn mark_abandoned(pool: &PgPool, session_id: i32) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "learning_sessions"
        SET "status" = 'abandoned'
        WHERE "id" = $1
        "#,
    )
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Flips stale active sessions to abandoned. Rows are kept: history feeds
/// streak and statistics queries.
pub async fn abandon_stale_sessions(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "learning_sessions"
        SET "status" = 'abandoned'
        WHERE "status" = 'active' AND "started_at" < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as i64)
}

pub async fn insert_response(
    pool: &PgPool,
    response: NewResponse<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_responses"
            ("session_id", "user_id", "trick_id", "statement_id", "user_response",
             "ai_feedback", "similarity_score", "is_correct", "analysis_data")
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(response.session_id)
    .bind(response.user_id)
    .bind(response.trick_id)
    .bind(response.statement_id)
    .bind(response.user_response)
    .bind(response.ai_feedback)
    .bind(response.similarity_score)
    .bind(response.is_correct)
    .bind(response.analysis_data)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn count_session_trick_responses(
    pool: &PgPool,
    session_id: i32,
    trick_id: i32,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM "user_responses"
        WHERE "session_id" = $1 AND "trick_id" = $2
        "#,
    )
    .bind(session_id)
    .bind(trick_id)
    .fetch_one(pool)
    .await
}

pub async fn fetch_session_stats(
    pool: &PgPool,
    session_id: i32,
) -> Result<SessionStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(DISTINCT "trick_id") AS "tricks_practiced",
            COUNT(*) AS "total_attempts",
            COUNT(CASE WHEN "is_correct" THEN 1 END) AS "correct_attempts",
            COALESCE(AVG("similarity_score" * 100), 0)::DOUBLE PRECISION AS "average_score"
        FROM "user_responses"
        WHERE "session_id" = $1
        "#,
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    Ok(SessionStats {
        tricks_practiced: row.try_get("tricks_practiced")?,
        total_attempts: row.try_get("total_attempts")?,
        correct_attempts: row.try_get("correct_attempts")?,
        average_score: row.try_get("average_score")?,
    })
}

/// Names of tricks that crossed the in-session mastery bar (score >= 0.8).
pub async fn fetch_session_mastered_tricks(
    pool: &PgPool,
    session_id: i32,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT lt."name"
        FROM "user_responses" ur
        JOIN "language_tricks" lt ON ur."trick_id" = lt."id"
        WHERE ur."session_id" = $1 AND ur."similarity_score" >= 0.8
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| r.try_get("name")).collect()
}

pub async fn fetch_session_history(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<SessionHistoryRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT
            ls."id", ls."session_type", ls."status", ls."started_at", ls."completed_at",
            ts."statement", ts."difficulty",
            COUNT(ur."id") AS "responses_count",
            COUNT(CASE WHEN ur."is_correct" THEN 1 END) AS "correct_count",
            COALESCE(AVG(ur."similarity_score" * 100), 0)::DOUBLE PRECISION AS "average_score"
        FROM "learning_sessions" ls
        JOIN "training_statements" ts ON ls."statement_id" = ts."id"
        LEFT JOIN "user_responses" ur ON ls."id" = ur."session_id"
        WHERE ls."user_id" = $1
        GROUP BY ls."id", ts."statement", ts."difficulty"
        ORDER BY ls."started_at" DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(SessionHistoryRow {
                session_id: row.try_get("id")?,
                session_type: row.try_get("session_type")?,
                status: row.try_get("status")?,
                started_at: row.try_get("started_at")?,
                completed_at: row.try_get("completed_at")?,
                statement: row.try_get("statement")?,
                difficulty: row.try_get("difficulty")?,
                responses_count: row.try_get("responses_count")?,
                correct_count: row.try_get("correct_count")?,
                average_score: row.try_get("average_score")?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct PeriodSessionStats {
    pub active_days: i64,
    pub total_sessions: i64,
    pub avg_session_minutes: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PeriodResponseStats {
    pub total_responses: i64,
    pub correct_responses: i64,
    pub avg_similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTrickStats {
    pub trick_name: String,
    pub attempts: i64,
    pub correct: i64,
    pub average_score: f64,
}

pub async fn fetch_period_session_stats(
    pool: &PgPool,
    user_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<PeriodSessionStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(DISTINCT DATE("started_at" AT TIME ZONE 'UTC')) AS "active_days",
            COUNT(*) AS "total_sessions",
            COALESCE(AVG(EXTRACT(EPOCH FROM ("completed_at" - "started_at")) / 60), 0)::DOUBLE PRECISION
                AS "avg_session_minutes"
        FROM "learning_sessions"
        WHERE "user_id" = $1 AND "started_at" >= $2 AND "completed_at" IS NOT NULL
        "#,
    )
    .bind(user_id)
    .bind(cutoff)
    .fetch_one(pool)
    .await?;

    Ok(PeriodSessionStats {
        active_days: row.try_get("active_days")?,
        total_sessions: row.try_get("total_sessions")?,
        avg_session_minutes: row.try_get("avg_session_minutes")?,
    })
}

pub async fn fetch_period_response_stats(
    pool: &PgPool,
    user_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<PeriodResponseStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS "total_responses",
            COUNT(CASE WHEN "is_correct" THEN 1 END) AS "correct_responses",
            COALESCE(AVG("similarity_score"), 0)::DOUBLE PRECISION AS "avg_similarity"
        FROM "user_responses"
        WHERE "user_id" = $1 AND "created_at" >= $2
        "#,
    )
    .bind(user_id)
    .bind(cutoff)
    .fetch_one(pool)
    .await?;

    Ok(PeriodResponseStats {
        total_responses: row.try_get("total_responses")?,
        correct_responses: row.try_get("correct_responses")?,
        avg_similarity: row.try_get("avg_similarity")?,
    })
}

pub async fn fetch_period_trick_stats(
    pool: &PgPool,
    user_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<Vec<PeriodTrickStats>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT
            lt."name" AS "trick_name",
            COUNT(ur."id") AS "attempts",
            COUNT(CASE WHEN ur."is_correct" THEN 1 END) AS "correct",
            COALESCE(AVG(ur."similarity_score" * 100), 0)::DOUBLE PRECISION AS "average_score"
        FROM "user_responses" ur
        JOIN "language_tricks" lt ON ur."trick_id" = lt."id"
        WHERE ur."user_id" = $1 AND ur."created_at" >= $2
        GROUP BY lt."id", lt."name"
        ORDER BY "attempts" DESC
        "#,
    )
    .bind(user_id)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(PeriodTrickStats {
                trick_name: row.try_get("trick_name")?,
                attempts: row.try_get("attempts")?,
                correct: row.try_get("correct")?,
                average_score: row.try_get("average_score")?,
            })
        })
        .collect()
}
