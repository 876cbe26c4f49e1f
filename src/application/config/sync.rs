use super::{env_opt, env_parse};

/// Background exam-sync settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Service LMS account used by the scheduler (env: `SYNC_LMS_USERNAME`)
    pub username: Option<String>,
    pub password: Option<String>,
    pub interval_hours: u64,
    /// Delay before the first run after startup
    pub initial_delay_secs: u64,
    pub snapshot_retention_days: i64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            username: env_opt("SYNC_LMS_USERNAME"),
            password: env_opt("SYNC_LMS_PASSWORD"),
            interval_hours: env_parse("SYNC_INTERVAL_HOURS", 6).max(1),
            initial_delay_secs: env_parse("SYNC_INITIAL_DELAY_SECS", 60),
            snapshot_retention_days: env_parse("SNAPSHOT_RETENTION_DAYS", 90),
        }
    }

    /// Service credentials, when both halves are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            interval_hours: 6,
            initial_delay_secs: 60,
            snapshot_retention_days: 90,
        }
    }
}
