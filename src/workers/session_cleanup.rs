use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::db::operations::sessions;
use crate::db::Database;

#[derive(Debug, Default)]
struct CleanupStats {
    abandoned_sessions: i64,
    duration_secs: f64,
}

/// Flips active sessions older than `max_age_days` to abandoned. Session
/// rows are never deleted; history feeds streaks and statistics.
pub async fn abandon_stale_sessions(
    db: Arc<Database>,
    max_age_days: i64,
) -> Result<(), super::WorkerError> {
    let start = Instant::now();
    debug!("Starting stale session cleanup");

    let cutoff = Utc::now() - Duration::days(max_age_days);

    let mut stats = CleanupStats::default();
    stats.abandoned_sessions = sessions::abandon_stale_sessions(db.pool(), cutoff).await?;
    stats.duration_secs = start.elapsed().as_secs_f64();

    info!(
        abandoned_sessions = stats.abandoned_sessions,
        max_age_days,
        duration_secs = format!("{:.2}", stats.duration_secs),
        "Stale session cleanup completed"
    );

    Ok(())
}
