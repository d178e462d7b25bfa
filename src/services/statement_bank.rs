use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::db::operations::catalog;
use crate::db::Database;
use crate::services::trick_catalog::CatalogError;

pub use crate::db::operations::catalog::TrainingStatement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Pool of training statements. One statement anchors a whole session.
/// By-id lookups are cached lazily; random selection stays in SQL.
pub struct StatementBank {
    db: Arc<Database>,
    cache: RwLock<HashMap<i32, TrainingStatement>>,
}

impl StatementBank {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_statement(
        &self,
        statement_id: i32,
    ) -> Result<TrainingStatement, CatalogError> {
        if let Some(cached) = self.cache.read().await.get(&statement_id) {
            return Ok(cached.clone());
        }

        let statement = catalog::fetch_statement(self.db.pool(), statement_id)
            .await?
            .ok_or(CatalogError::StatementNotFound(statement_id))?;

        let mut guard = self.cache.write().await;
        guard.insert(statement_id, statement.clone());
        Ok(statement)
    }

    /// A random statement, optionally restricted to one difficulty. Fails
    /// when the filtered pool is empty.
    pub async fn random_statement(
        &self,
        difficulty: Option<Difficulty>,
    ) -> Result<TrainingStatement, CatalogError> {
        catalog::fetch_random_statement(self.db.pool(), difficulty.map(|d| d.as_str()))
            .await?
            .ok_or(CatalogError::NoStatements)
    }

    pub async fn statements_by_difficulty(
        &self,
        difficulty: Difficulty,
    ) -> Result<Vec<TrainingStatement>, CatalogError> {
        Ok(catalog::fetch_statements_by_difficulty(self.db.pool(), difficulty.as_str()).await?)
    }

    pub async fn invalidate(&self) {
        let mut guard = self.cache.write().await;
        guard.clear();
        info!("Statement cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_round_trips_through_str() {
        for d in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert_eq!(Difficulty::parse(d.as_str()), Some(d));
        }
    }

    #[test]
    fn unknown_difficulty_is_rejected() {
        assert_eq!(Difficulty::parse("extreme"), None);
    }
}
