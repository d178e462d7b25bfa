use crate::services::session_manager::STALE_SESSION_DAYS;
use crate::workers::reminder::{DEFAULT_INACTIVITY_DAYS, DEFAULT_TRIGGER_HOUR_UTC};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Directory for daily-rolling file logs; `None` logs to stdout only.
    pub log_dir: Option<String>,
    pub reminder_trigger_hour_utc: u32,
    pub reminder_inactivity_days: i64,
    pub session_stale_days: i64,
    /// 6-field cron expression for the stale-session cleanup job.
    pub session_cleanup_schedule: String,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let file_logs_enabled = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let log_dir = file_logs_enabled
            .then(|| std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()));

        let reminder_trigger_hour_utc = std::env::var("REMINDER_TRIGGER_HOUR_UTC")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|hour| *hour < 24)
            .unwrap_or(DEFAULT_TRIGGER_HOUR_UTC);

        let reminder_inactivity_days = std::env::var("REMINDER_INACTIVITY_DAYS")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_INACTIVITY_DAYS);

        let session_stale_days = std::env::var("SESSION_STALE_DAYS")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|days| *days > 0)
            .unwrap_or(STALE_SESSION_DAYS);

        let session_cleanup_schedule = std::env::var("SESSION_CLEANUP_SCHEDULE")
            .unwrap_or_else(|_| "0 30 3 * * *".to_string());

        Self {
            log_level,
            log_dir,
            reminder_trigger_hour_utc,
            reminder_inactivity_days,
            session_stale_days,
            session_cleanup_schedule,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            reminder_trigger_hour_utc: DEFAULT_TRIGGER_HOUR_UTC,
            reminder_inactivity_days: DEFAULT_INACTIVITY_DAYS,
            session_stale_days: STALE_SESSION_DAYS,
            session_cleanup_schedule: "0 30 3 * * *".to_string(),
        }
    }
}
