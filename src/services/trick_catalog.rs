//! Catalog of the 14 language reframing tricks.
//!
//! Loaded lazily from the database on first access and cached until
//! `invalidate` is called. The catalog is an owned object shared via `Arc`;
//! consumers only ever read it.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::db::operations::catalog;
use crate::db::Database;

pub use crate::db::operations::catalog::LanguageTrick;

pub const TRICK_COUNT: i32 = 14;
pub const DEFAULT_EXAMPLE_CONTEXT: &str = "everyday";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("language trick {0} not found")]
    TrickNotFound(i32),
    #[error("training statement {0} not found")]
    StatementNotFound(i32),
    #[error("no training statements match the requested difficulty")]
    NoStatements,
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrickSummary {
    pub id: i32,
    pub name: String,
    pub definition: String,
    pub keyword_count: usize,
    pub example_count: usize,
}

pub struct TrickCatalog {
    db: Arc<Database>,
    cache: RwLock<Option<Arc<Vec<LanguageTrick>>>>,
}

impl TrickCatalog {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
        }
    }

    /// All tricks in ascending id order, from cache when warm.
    pub async fn all_tricks(&self) -> Result<Arc<Vec<LanguageTrick>>, CatalogError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(cached));
        }

        let tricks = Arc::new(catalog::fetch_all_tricks(self.db.pool()).await?);
        info!(count = tricks.len(), "Loaded language tricks");

        let mut guard = self.cache.write().await;
        *guard = Some(Arc::clone(&tricks));
        Ok(tricks)
    }

    pub async fn get_trick(&self, trick_id: i32) -> Result<LanguageTrick, CatalogError> {
        let tricks = self.all_tricks().await?;
        tricks
            .iter()
            .find(|t| t.id == trick_id)
            .cloned()
            .ok_or(CatalogError::TrickNotFound(trick_id))
    }

    /// Examples for a context tag, falling back to the everyday set when the
    /// requested tag has none.
    pub async fn examples_for(
        &self,
        trick_id: i32,
        context: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let trick = self.get_trick(trick_id).await?;

        let mut examples = trick.examples.get(context).cloned().unwrap_or_default();
        if examples.is_empty() && context != DEFAULT_EXAMPLE_CONTEXT {
            examples = trick
                .examples
                .get(DEFAULT_EXAMPLE_CONTEXT)
                .cloned()
                .unwrap_or_default();
        }

        Ok(examples)
    }

    /// Up to `count` examples sampled without replacement; empty when the
    /// trick has no examples for the context.
    pub async fn random_examples(
        &self,
        trick_id: i32,
        count: usize,
        context: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let examples = self.examples_for(trick_id, context).await?;
        Ok(sample_examples(&examples, count))
    }

    pub async fn formatted_keywords(&self, trick_id: i32) -> Result<String, CatalogError> {
        let trick = self.get_trick(trick_id).await?;
        Ok(trick.keywords.join(", "))
    }

    pub async fn summary(&self) -> Result<Vec<TrickSummary>, CatalogError> {
        let tricks = self.all_tricks().await?;

        Ok(tricks
            .iter()
            .map(|trick| TrickSummary {
                id: trick.id,
                name: trick.name.clone(),
                definition: truncate_definition(&trick.definition, 100),
                keyword_count: trick.keywords.len(),
                example_count: trick.examples.values().map(Vec::len).sum(),
            })
            .collect())
    }

    pub async fn invalidate(&self) {
        let mut guard = self.cache.write().await;
        *guard = None;
        info!("Trick catalog cache invalidated");
    }
}

fn sample_examples(examples: &[String], count: usize) -> Vec<String> {
    let mut rng = rand::rng();
    examples
        .choose_multiple(&mut rng, count.min(examples.len()))
        .cloned()
        .collect()
}

fn truncate_definition(definition: &str, max_chars: usize) -> String {
    if definition.chars().count() <= max_chars {
        return definition.to_string();
    }
    let truncated: String = definition.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_pool() -> Vec<String> {
        vec![
            "first".to_string(),
            "second".to_string(),
            "third".to_string(),
        ]
    }

    #[test]
    fn sample_respects_count() {
        let pool = example_pool();
        let sampled = sample_examples(&pool, 2);
        assert_eq!(sampled.len(), 2);
    }

    #[test]
    fn sample_is_bounded_by_pool_size() {
        let pool = example_pool();
        let sampled = sample_examples(&pool, 10);
        assert_eq!(sampled.len(), 3);
    }

    #[test]
    fn sample_has_no_duplicates() {
        let pool = example_pool();
        let mut sampled = sample_examples(&pool, 3);
        sampled.sort();
        sampled.dedup();
        assert_eq!(sampled.len(), 3);
    }

    #[test]
    fn sample_from_empty_pool_is_empty() {
        assert!(sample_examples(&[], 2).is_empty());
    }

    #[test]
    fn truncation_keeps_short_definitions() {
        assert_eq!(truncate_definition("short", 100), "short");
    }

    #[test]
    fn truncation_appends_ellipsis() {
        let long = "x".repeat(150);
        let truncated = truncate_definition(&long, 100);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 103);
    }
}
