//! Idempotent seeding of the trick catalog and statement bank from the
//! bundled JSON data. Runs at startup; existing rows are left untouched.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::db::operations::catalog;
use crate::db::Database;

const LANGUAGE_PATTERNS_JSON: &str = include_str!("../data/language_patterns.json");
const TRAINING_STATEMENTS_JSON: &str = include_str!("../data/training_statements.json");

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed data is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Deserialize)]
struct PatternsFile {
    #[serde(rename = "languagePatterns")]
    language_patterns: PatternsBody,
}

#[derive(Deserialize)]
struct PatternsBody {
    patterns: Vec<PatternEntry>,
}

#[derive(Deserialize)]
struct PatternEntry {
    id: i32,
    name: String,
    definition: String,
    keywords: Vec<String>,
    examples: HashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct StatementsFile {
    #[serde(rename = "trainingStatements")]
    training_statements: Vec<StatementEntry>,
}

#[derive(Deserialize)]
struct StatementEntry {
    id: i32,
    statement: String,
    category: String,
    difficulty: String,
}

pub async fn seed_learning_data(db: &Database) -> Result<(), SeedError> {
    seed_language_tricks(db).await?;
    seed_training_statements(db).await?;
    Ok(())
}

async fn seed_language_tricks(db: &Database) -> Result<(), SeedError> {
    let existing = catalog::count_tricks(db.pool()).await?;
    if existing > 0 {
        info!(count = existing, "Language tricks already loaded");
        return Ok(());
    }

    let file: PatternsFile = serde_json::from_str(LANGUAGE_PATTERNS_JSON)?;
    let patterns = file.language_patterns.patterns;

    for pattern in &patterns {
        sqlx::query(
            r#"
            INSERT INTO "language_tricks" ("id", "name", "definition", "keywords", "examples")
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(pattern.id)
        .bind(&pattern.name)
        .bind(&pattern.definition)
        .bind(serde_json::to_value(&pattern.keywords)?)
        .bind(serde_json::to_value(&pattern.examples)?)
        .execute(db.pool())
        .await?;
    }

    info!(count = patterns.len(), "Seeded language tricks");
    Ok(())
}

async fn seed_training_statements(db: &Database) -> Result<(), SeedError> {
    let existing = catalog::count_statements(db.pool()).await?;
    if existing > 0 {
        info!(count = existing, "Training statements already loaded");
        return Ok(());
    }

    let file: StatementsFile = serde_json::from_str(TRAINING_STATEMENTS_JSON)?;

    for statement in &file.training_statements {
        sqlx::query(
            r#"
            INSERT INTO "training_statements" ("id", "statement", "category", "difficulty")
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(statement.id)
        .bind(&statement.statement)
        .bind(&statement.category)
        .bind(&statement.difficulty)
        .execute(db.pool())
        .await?;
    }

    info!(
        count = file.training_statements.len(),
        "Seeded training statements"
    );
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SeedIntegrity {
    pub tricks_count: i64,
    pub statements_count: i64,
    pub missing_tricks: Vec<i32>,
    pub difficulty_distribution: HashMap<String, i64>,
    pub is_valid: bool,
}

pub async fn validate_seed_integrity(db: &Database) -> Result<SeedIntegrity, sqlx::Error> {
    let pool = db.pool();

    let tricks_count = catalog::count_tricks(pool).await?;
    let statements_count = catalog::count_statements(pool).await?;
    let missing_tricks =
        catalog::missing_trick_ids(pool, crate::services::trick_catalog::TRICK_COUNT).await?;
    let difficulty_distribution = catalog::difficulty_distribution(pool).await?;

    let is_valid = tricks_count == crate::services::trick_catalog::TRICK_COUNT as i64
        && missing_tricks.is_empty()
        && statements_count > 0;

    Ok(SeedIntegrity {
        tricks_count,
        statements_count,
        missing_tricks,
        difficulty_distribution,
        is_valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_patterns_parse_and_cover_all_tricks() {
        let file: PatternsFile = serde_json::from_str(LANGUAGE_PATTERNS_JSON).unwrap();
        let patterns = file.language_patterns.patterns;
        assert_eq!(patterns.len(), 14);

        let mut ids: Vec<i32> = patterns.iter().map(|p| p.id).collect();
        ids.sort();
        assert_eq!(ids, (1..=14).collect::<Vec<_>>());

        for pattern in &patterns {
            assert!(!pattern.keywords.is_empty(), "trick {} has no keywords", pattern.id);
            assert!(
                pattern.examples.contains_key("everyday"),
                "trick {} has no everyday examples",
                pattern.id
            );
        }
    }

    #[test]
    fn bundled_statements_parse_with_known_difficulties() {
        let file: StatementsFile = serde_json::from_str(TRAINING_STATEMENTS_JSON).unwrap();
        assert!(!file.training_statements.is_empty());

        for statement in &file.training_statements {
            assert!(
                matches!(statement.difficulty.as_str(), "easy" | "medium" | "hard"),
                "statement {} has unknown difficulty {}",
                statement.id,
                statement.difficulty
            );
        }
    }
}
