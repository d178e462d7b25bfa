//! Daily practice reminders.
//!
//! One cooperative loop: sleep until the fixed daily trigger, then scan for
//! users whose practice AND reminder timestamps are both outside the
//! inactivity window. Per-user failures never abort the batch; a recipient
//! that blocked delivery is auto-disabled permanently. A loop-level error
//! backs off one hour and retries; the scheduler itself never terminates
//! until `stop` is called.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::db::operations::reminders;
use crate::db::Database;
use crate::services::notifier::{DeliveryError, Notifier};

pub use crate::db::operations::reminders::ReminderStats;

pub const DEFAULT_TRIGGER_HOUR_UTC: u32 = 12;
pub const DEFAULT_INACTIVITY_DAYS: i64 = 7;

const LOOP_ERROR_BACKOFF: StdDuration = StdDuration::from_secs(3600);

/// Rotating retention messages, cycled round-robin per process.
pub const REMINDER_MESSAGES: [&str; 3] = [
    "Time to practice! A week has passed since your last training. \
     Send /learn to pick up where you left off.",
    "Your reframing skills miss you - seven days without practice. \
     Start with /learn or /continue.",
    "Don't let the techniques fade! It has been a week; a short session \
     keeps them sharp. /learn is waiting.",
];

pub struct ReminderScheduler {
    db: Arc<Database>,
    notifier: Arc<Notifier>,
    trigger_hour_utc: u32,
    inactivity_days: i64,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    message_index: AtomicUsize,
}

impl ReminderScheduler {
    pub fn new(
        db: Arc<Database>,
        notifier: Arc<Notifier>,
        trigger_hour_utc: u32,
        inactivity_days: i64,
    ) -> Self {
        Self {
            db,
            notifier,
            trigger_hour_utc: trigger_hour_utc.min(23),
            inactivity_days,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            message_index: AtomicUsize::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::Relaxed) {
            warn!("Reminder scheduler is already running");
            return;
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            scheduler.run_loop().await;
        });

        let mut guard = self.task.lock().await;
        *guard = Some(handle);
        info!("Reminder scheduler started");
    }

    /// Cancels the sleeping loop without surfacing the cancellation.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        info!("Reminder scheduler stopped");
    }

    async fn run_loop(self: Arc<Self>) {
        while self.is_running() {
            let wait = seconds_until_trigger(Utc::now(), self.trigger_hour_utc);
            info!(
                seconds = wait.as_secs(),
                trigger_hour_utc = self.trigger_hour_utc,
                "Next reminder check scheduled"
            );
            sleep(wait).await;

            if !self.is_running() {
                break;
            }

            if let Err(err) = self.check_and_send().await {
                error!(error = %err, "Reminder batch failed, backing off");
                sleep(LOOP_ERROR_BACKOFF).await;
            }
        }
    }

    async fn check_and_send(&self) -> Result<(), sqlx::Error> {
        let cutoff = Utc::now() - Duration::days(self.inactivity_days);
        let users = reminders::fetch_users_to_remind(self.db.pool(), cutoff).await?;

        info!(count = users.len(), "Running daily reminder check");

        for user in users {
            if let Err(err) = self.send_reminder(user.user_id).await {
                error!(user_id = user.user_id, error = %err, "Failed to process reminder");
            }
        }

        Ok(())
    }

    /// Delivery failures are classified, not propagated: blocked recipients
    /// are disabled, anything else is logged and skipped.
    async fn send_reminder(&self, user_id: i64) -> Result<(), sqlx::Error> {
        let index = self.message_index.fetch_add(1, Ordering::Relaxed);
        let message = REMINDER_MESSAGES[index % REMINDER_MESSAGES.len()];

        match self.notifier.send(user_id, message).await {
            Ok(()) => {
                reminders::record_reminder_sent(self.db.pool(), user_id, Utc::now()).await?;
                info!(user_id, "Sent practice reminder");
            }
            Err(DeliveryError::Blocked) => {
                reminders::set_reminders_enabled(self.db.pool(), user_id, false, Utc::now())
                    .await?;
                warn!(user_id, "Recipient blocked delivery, reminders disabled");
            }
            Err(err) => {
                error!(user_id, error = %err, "Reminder delivery failed");
            }
        }

        Ok(())
    }

    /// Called by the session layer whenever a response is scored, so the
    /// eligibility window tracks real practice.
    pub async fn update_practice_timestamp(&self, user_id: i64) -> Result<(), sqlx::Error> {
        reminders::touch_practice(self.db.pool(), user_id, Utc::now()).await?;
        debug!(user_id, "Updated practice timestamp");
        Ok(())
    }

    pub async fn toggle_reminders(&self, user_id: i64, enabled: bool) -> Result<(), sqlx::Error> {
        reminders::set_reminders_enabled(self.db.pool(), user_id, enabled, Utc::now()).await?;
        info!(user_id, enabled, "Toggled reminders");
        Ok(())
    }

    /// Maintainer path: ignores eligibility, still records the dispatch and
    /// applies the blocked auto-disable. Returns whether delivery succeeded.
    pub async fn force_send_reminder(&self, user_id: i64) -> Result<bool, sqlx::Error> {
        match self.notifier.send(user_id, REMINDER_MESSAGES[0]).await {
            Ok(()) => {
                reminders::record_reminder_sent(self.db.pool(), user_id, Utc::now()).await?;
                info!(user_id, "Force-sent reminder");
                Ok(true)
            }
            Err(DeliveryError::Blocked) => {
                reminders::set_reminders_enabled(self.db.pool(), user_id, false, Utc::now())
                    .await?;
                warn!(user_id, "Recipient blocked delivery, reminders disabled");
                Ok(false)
            }
            Err(err) => {
                error!(user_id, error = %err, "Force reminder delivery failed");
                Ok(false)
            }
        }
    }

    pub async fn reminder_stats(&self) -> Result<ReminderStats, sqlx::Error> {
        reminders::fetch_reminder_stats(self.db.pool()).await
    }
}

/// Time to sleep until the next `trigger_hour:00:00` UTC. If the trigger has
/// already passed today, targets tomorrow.
pub fn seconds_until_trigger(now: DateTime<Utc>, trigger_hour: u32) -> StdDuration {
    let trigger_time =
        NaiveTime::from_hms_opt(trigger_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);

    let mut next = now.date_naive().and_time(trigger_time).and_utc();
    if now >= next {
        next += Duration::days(1);
    }

    (next - now).to_std().unwrap_or(StdDuration::from_secs(60))
}

/// Mirror of the eligibility query's predicate, kept testable in isolation:
/// reminders must be enabled and both timestamps missing or at/after the
/// staleness cutoff.
pub fn is_reminder_eligible(
    reminders_enabled: bool,
    last_practice: Option<DateTime<Utc>>,
    last_reminder: Option<DateTime<Utc>>,
    cutoff: DateTime<Utc>,
) -> bool {
    reminders_enabled
        && last_practice.map_or(true, |t| t <= cutoff)
        && last_reminder.map_or(true, |t| t <= cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn trigger_later_today_is_targeted() {
        let wait = seconds_until_trigger(at(9, 0), 12);
        assert_eq!(wait.as_secs(), 3 * 3600);
    }

    #[test]
    fn trigger_already_passed_targets_tomorrow() {
        let wait = seconds_until_trigger(at(13, 30), 12);
        assert_eq!(wait.as_secs(), 22 * 3600 + 1800);
    }

    #[test]
    fn exactly_at_trigger_waits_a_full_day() {
        let wait = seconds_until_trigger(at(12, 0), 12);
        assert_eq!(wait.as_secs(), 24 * 3600);
    }

    #[test]
    fn disabled_user_is_never_eligible() {
        let cutoff = at(12, 0);
        let ancient = Some(cutoff - Duration::days(100));
        assert!(!is_reminder_eligible(false, ancient, ancient, cutoff));
    }

    #[test]
    fn fresh_practice_blocks_eligibility() {
        let cutoff = at(12, 0);
        let today = Some(cutoff + Duration::days(6));
        assert!(!is_reminder_eligible(true, today, None, cutoff));
    }

    #[test]
    fn recent_reminder_blocks_re_reminding() {
        let cutoff = at(12, 0);
        let stale = Some(cutoff - Duration::days(3));
        let recent = Some(cutoff + Duration::days(5));
        assert!(!is_reminder_eligible(true, stale, recent, cutoff));
    }

    #[test]
    fn never_practiced_never_reminded_is_eligible() {
        let cutoff = at(12, 0);
        assert!(is_reminder_eligible(true, None, None, cutoff));
    }

    #[test]
    fn both_stale_is_eligible() {
        let cutoff = at(12, 0);
        let stale = Some(cutoff - Duration::days(1));
        assert!(is_reminder_eligible(true, stale, stale, cutoff));
    }

    #[test]
    fn message_rotation_is_deterministic() {
        let picks: Vec<&str> = (0..6)
            .map(|i| REMINDER_MESSAGES[i % REMINDER_MESSAGES.len()])
            .collect();
        assert_eq!(picks[0], picks[3]);
        assert_eq!(picks[1], picks[4]);
        assert_ne!(picks[0], picks[1]);
    }
}
