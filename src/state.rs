use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::services::notifier::Notifier;
use crate::services::progress_tracker::ProgressTracker;
use crate::services::scoring::{LlmClient, ScoringOracle};
use crate::services::session_manager::SessionManager;
use crate::services::statement_bank::StatementBank;
use crate::services::trick_catalog::TrickCatalog;
use crate::workers::ReminderScheduler;

/// Wires the engines together. The chat layer (and tests) hold one of these
/// and reach every operation through it.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    catalog: Arc<TrickCatalog>,
    statements: Arc<StatementBank>,
    oracle: Arc<ScoringOracle>,
    progress: Arc<ProgressTracker>,
    sessions: Arc<SessionManager>,
    notifier: Arc<Notifier>,
    reminders: Arc<ReminderScheduler>,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        let catalog = Arc::new(TrickCatalog::new(Arc::clone(&db)));
        let statements = Arc::new(StatementBank::new(Arc::clone(&db)));
        let oracle = Arc::new(ScoringOracle::new(
            LlmClient::from_env(),
            Arc::clone(&catalog),
        ));
        let progress = Arc::new(ProgressTracker::new(
            Arc::clone(&db),
            Arc::clone(&catalog),
        ));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&db),
            Arc::clone(&catalog),
            Arc::clone(&statements),
            Arc::clone(&oracle),
            Arc::clone(&progress),
        ));
        let notifier = Arc::new(Notifier::from_env());
        let reminders = Arc::new(ReminderScheduler::new(
            Arc::clone(&db),
            Arc::clone(&notifier),
            config.reminder_trigger_hour_utc,
            config.reminder_inactivity_days,
        ));

        Self {
            db,
            catalog,
            statements,
            oracle,
            progress,
            sessions,
            notifier,
            reminders,
        }
    }

    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    pub fn catalog(&self) -> Arc<TrickCatalog> {
        Arc::clone(&self.catalog)
    }

    pub fn statements(&self) -> Arc<StatementBank> {
        Arc::clone(&self.statements)
    }

    pub fn oracle(&self) -> Arc<ScoringOracle> {
        Arc::clone(&self.oracle)
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    pub fn notifier(&self) -> Arc<Notifier> {
        Arc::clone(&self.notifier)
    }

    pub fn reminders(&self) -> Arc<ReminderScheduler> {
        Arc::clone(&self.reminders)
    }
}
