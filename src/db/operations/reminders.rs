use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct ReminderTracking {
    pub user_id: i64,
    pub last_practice_date: Option<DateTime<Utc>>,
    pub last_reminder_date: Option<DateTime<Utc>>,
    pub reminder_count: i32,
    pub reminders_enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReminderStats {
    pub tracked_users: i64,
    pub enabled_users: i64,
    pub reminded_users: i64,
    pub avg_reminders_per_user: f64,
}

fn map_tracking_row(row: &PgRow) -> Result<ReminderTracking, sqlx::Error> {
    Ok(ReminderTracking {
        user_id: row.try_get("user_id")?,
        last_practice_date: row.try_get("last_practice_date")?,
        last_reminder_date: row.try_get("last_reminder_date")?,
        reminder_count: row.try_get("reminder_count")?,
        reminders_enabled: row.try_get("reminders_enabled")?,
    })
}

pub async fn fetch_tracking(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<ReminderTracking>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "user_id", "last_practice_date", "last_reminder_date",
               "reminder_count", "reminders_enabled"
        FROM "reminder_tracking"
        WHERE "user_id" = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_tracking_row).transpose()
}

/// Users due a reminder: reminders enabled, and both the practice and the
/// reminder timestamp are missing or older than the cutoff. Requiring both
/// keeps a user reminded inside the window from being reminded again even if
/// they never practiced.
pub async fn fetch_users_to_remind(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<ReminderTracking>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "user_id", "last_practice_date", "last_reminder_date",
               "reminder_count", "reminders_enabled"
        FROM "reminder_tracking"
        WHERE "reminders_enabled" = TRUE
          AND ("last_practice_date" IS NULL OR "last_practice_date" <= $1)
          AND ("last_reminder_date" IS NULL OR "last_reminder_date" <= $1)
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_tracking_row).collect()
}

pub async fn record_reminder_sent(
    pool: &PgPool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "reminder_tracking"
        SET "last_reminder_date" = $1,
            "reminder_count" = "reminder_count" + 1,
            "updated_at" = $1
        WHERE "user_id" = $2
        "#,
    )
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn touch_practice(
    pool: &PgPool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "reminder_tracking" ("user_id", "last_practice_date", "updated_at")
        VALUES ($1, $2, $2)
        ON CONFLICT ("user_id")
        DO UPDATE SET "last_practice_date" = $2, "updated_at" = $2
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_reminders_enabled(
    pool: &PgPool,
    user_id: i64,
    enabled: bool,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "reminder_tracking" ("user_id", "reminders_enabled", "updated_at")
        VALUES ($1, $2, $3)
        ON CONFLICT ("user_id")
        DO UPDATE SET "reminders_enabled" = $2, "updated_at" = $3
        "#,
    )
    .bind(user_id)
    .bind(enabled)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_reminder_stats(pool: &PgPool) -> Result<ReminderStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS "tracked_users",
            COUNT(CASE WHEN "reminders_enabled" THEN 1 END) AS "enabled_users",
            COUNT(CASE WHEN "last_reminder_date" IS NOT NULL THEN 1 END) AS "reminded_users",
            COALESCE(AVG("reminder_count"), 0)::DOUBLE PRECISION AS "avg_reminders_per_user"
        FROM "reminder_tracking"
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(ReminderStats {
        tracked_users: row.try_get("tracked_users")?,
        enabled_users: row.try_get("enabled_users")?,
        reminded_users: row.try_get("reminded_users")?,
        avg_reminders_per_user: row.try_get("avg_reminders_per_user")?,
    })
}
