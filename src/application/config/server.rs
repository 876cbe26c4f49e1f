use std::env;
use std::path::PathBuf;

use super::env_parse;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins, parsed from `DASHBOARD_ALLOWED_ORIGINS` (comma-separated).
    /// When empty, any origin is allowed (dev convenience).
    pub allowed_origins: Vec<String>,
    /// Directory holding the built single-page frontend
    pub static_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let allowed_origins = env::var("DASHBOARD_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: env::var("DASHBOARD_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("DASHBOARD_API_PORT", 5000),
            allowed_origins,
            static_dir: PathBuf::from(
                env::var("DASHBOARD_STATIC_DIR").unwrap_or_else(|_| "frontend/dist".to_string()),
            ),
        }
    }
}
