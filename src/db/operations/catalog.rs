use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// One of the 14 reframing tricks. Immutable after seed load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageTrick {
    pub id: i32,
    pub name: String,
    pub definition: String,
    pub keywords: Vec<String>,
    pub examples: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatement {
    pub id: i32,
    pub statement: String,
    pub category: String,
    pub difficulty: String,
}

fn map_trick_row(row: &PgRow) -> Result<LanguageTrick, sqlx::Error> {
    let keywords: serde_json::Value = row.try_get("keywords")?;
    let examples: serde_json::Value = row.try_get("examples")?;

    Ok(LanguageTrick {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        definition: row.try_get("definition")?,
        keywords: serde_json::from_value(keywords).unwrap_or_default(),
        examples: serde_json::from_value(examples).unwrap_or_default(),
    })
}

fn map_statement_row(row: &PgRow) -> Result<TrainingStatement, sqlx::Error> {
    Ok(TrainingStatement {
        id: row.try_get("id")?,
        statement: row.try_get("statement")?,
        category: row.try_get("category")?,
        difficulty: row.try_get("difficulty")?,
    })
}

pub async fn fetch_all_tricks(pool: &PgPool) -> Result<Vec<LanguageTrick>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "name", "definition", "keywords", "examples"
        FROM "language_tricks"
        ORDER BY "id"
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_trick_row).collect()
}

pub async fn fetch_trick(
    pool: &PgPool,
    trick_id: i32,
) -> Result<Option<LanguageTrick>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "name", "definition", "keywords", "examples"
        FROM "language_tricks"
        WHERE "id" = $1
        "#,
    )
    .bind(trick_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_trick_row).transpose()
}

pub async fn fetch_statement(
    pool: &PgPool,
    statement_id: i32,
) -> Result<Option<TrainingStatement>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "statement", "category", "difficulty"
        FROM "training_statements"
        WHERE "id" = $1
        "#,
    )
    .bind(statement_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_statement_row).transpose()
}

pub async fn fetch_statements_by_difficulty(
    pool: &PgPool,
    difficulty: &str,
) -> Result<Vec<TrainingStatement>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "statement", "category", "difficulty"
        FROM "training_statements"
        WHERE "difficulty" = $1
        ORDER BY "id"
        "#,
    )
    .bind(difficulty)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_statement_row).collect()
}

pub async fn fetch_random_statement(
    pool: &PgPool,
    difficulty: Option<&str>,
) -> Result<Option<TrainingStatement>, sqlx::Error> {
    let row = match difficulty {
        Some(level) => {
            sqlx::query(
                r#"
                SELECT "id", "statement", "category", "difficulty"
                FROM "training_statements"
                WHERE "difficulty" = $1
                ORDER BY RANDOM()
                LIMIT 1
                "#,
            )
            .bind(level)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT "id", "statement", "category", "difficulty"
                FROM "training_statements"
                ORDER BY RANDOM()
                LIMIT 1
                "#,
            )
            .fetch_optional(pool)
            .await?
        }
    };

    row.as_ref().map(map_statement_row).transpose()
}

pub async fn count_tricks(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "language_tricks""#)
        .fetch_one(pool)
        .await
}

pub async fn count_statements(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "training_statements""#)
        .fetch_one(pool)
        .await
}

pub async fn missing_trick_ids(pool: &PgPool, expected: i32) -> Result<Vec<i32>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT generate_series(1, $1) AS "expected_id"
        EXCEPT
        SELECT "id" FROM "language_tricks"
        ORDER BY "expected_id"
        "#,
    )
    .bind(expected)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| r.try_get("expected_id")).collect()
}

pub async fn difficulty_distribution(
    pool: &PgPool,
) -> Result<HashMap<String, i64>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "difficulty", COUNT(*) AS "count"
        FROM "training_statements"
        GROUP BY "difficulty"
        ORDER BY "difficulty"
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| Ok((r.try_get("difficulty")?, r.try_get("count")?)))
        .collect()
}
