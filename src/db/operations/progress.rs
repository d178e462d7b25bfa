use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Per-(user, trick) mastery aggregate. `mastery_level` is only ever written
/// through the progress tracker's update path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub user_id: i64,
    pub trick_id: i32,
    pub mastery_level: i32,
    pub total_attempts: i32,
    pub correct_attempts: i32,
    pub last_practiced: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProgress {
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.correct_attempts as f64 / self.total_attempts as f64 * 100.0
    }

    pub fn is_mastered(&self) -> bool {
        self.mastery_level >= crate::services::progress_tracker::MASTERY_THRESHOLD
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressStats {
    pub practiced_tricks: i64,
    pub mastered_tricks: i64,
    pub average_mastery: f64,
    pub total_attempts: i64,
    pub total_correct: i64,
    pub last_session: Option<DateTime<Utc>>,
}

fn map_progress_row(row: &PgRow) -> Result<UserProgress, sqlx::Error> {
    Ok(UserProgress {
        user_id: row.try_get("user_id")?,
        trick_id: row.try_get("trick_id")?,
        mastery_level: row.try_get("mastery_level")?,
        total_attempts: row.try_get("total_attempts")?,
        correct_attempts: row.try_get("correct_attempts")?,
        last_practiced: row.try_get("last_practiced")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn fetch_progress(
    pool: &PgPool,
    user_id: i64,
    trick_id: i32,
) -> Result<Option<UserProgress>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "user_id", "trick_id", "mastery_level", "total_attempts",
               "correct_attempts", "last_practiced", "created_at", "updated_at"
        FROM "user_progress"
        WHERE "user_id" = $1 AND "trick_id" = $2
        "#,
    )
    .bind(user_id)
    .bind(trick_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_progress_row).transpose()
}

pub async fn fetch_user_progress(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<UserProgress>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "user_id", "trick_id", "mastery_level", "total_attempts",
               "correct_attempts", "last_practiced", "created_at", "updated_at"
        FROM "user_progress"
        WHERE "user_id" = $1
        ORDER BY "trick_id"
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_progress_row).collect()
}

pub async fn insert_progress(
    pool: &PgPool,
    user_id: i64,
    trick_id: i32,
    mastery_level: i32,
    is_correct: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_progress"
            ("user_id", "trick_id", "mastery_level", "total_attempts",
             "correct_attempts", "last_practiced")
        VALUES ($1, $2, $3, 1, $4, NOW())
        "#,
    )
    .bind(user_id)
    .bind(trick_id)
    .bind(mastery_level)
    .bind(if is_correct { 1 } else { 0 })
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_progress_row(
    pool: &PgPool,
    user_id: i64,
    trick_id: i32,
    mastery_level: i32,
    total_attempts: i32,
    correct_attempts: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "user_progress"
        SET "mastery_level" = $1, "total_attempts" = $2, "correct_attempts" = $3,
            "last_practiced" = NOW(), "updated_at" = NOW()
        WHERE "user_id" = $4 AND "trick_id" = $5
        "#,
    )
    .bind(mastery_level)
    .bind(total_attempts)
    .bind(correct_attempts)
    .bind(user_id)
    .bind(trick_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_progress_stats(
    pool: &PgPool,
    user_id: i64,
    mastery_threshold: i32,
) -> Result<ProgressStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS "practiced_tricks",
            COUNT(CASE WHEN "mastery_level" >= $2 THEN 1 END) AS "mastered_tricks",
            COALESCE(AVG("mastery_level"), 0)::DOUBLE PRECISION AS "average_mastery",
            COALESCE(SUM("total_attempts"), 0)::BIGINT AS "total_attempts",
            COALESCE(SUM("correct_attempts"), 0)::BIGINT AS "total_correct",
            MAX("last_practiced") AS "last_session"
        FROM "user_progress"
        WHERE "user_id" = $1
        "#,
    )
    .bind(user_id)
    .bind(mastery_threshold)
    .fetch_one(pool)
    .await?;

    Ok(ProgressStats {
        practiced_tricks: row.try_get("practiced_tricks")?,
        mastered_tricks: row.try_get("mastered_tricks")?,
        average_mastery: row.try_get("average_mastery")?,
        total_attempts: row.try_get("total_attempts")?,
        total_correct: row.try_get("total_correct")?,
        last_session: row.try_get("last_session")?,
    })
}

/// Distinct practice days, most recent first, for the streak walk.
pub async fn fetch_practice_dates(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<NaiveDate>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT DATE("last_practiced" AT TIME ZONE 'UTC') AS "practice_date"
        FROM "user_progress"
        WHERE "user_id" = $1 AND "last_practiced" IS NOT NULL
        ORDER BY "practice_date" DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| r.try_get("practice_date")).collect()
}
