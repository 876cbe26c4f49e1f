use std::env;

use super::{env_opt, env_parse};

/// Connection settings for the LMS REST API
#[derive(Debug, Clone)]
pub struct LmsConfig {
    /// REST base URL (env: `LMS_BASE_URL`)
    pub base_url: String,
    /// Tenant API key sent as `x-api-key` (env: `LMS_API_KEY`)
    pub api_key: String,
    /// Private key included in the authentication payload (env: `LMS_PRIVATE_KEY`)
    pub private_key: String,
    pub timeout_secs: u64,
    /// Maximum concurrent per-student enrollment requests
    pub concurrency: usize,
    /// How long a department roster stays cached
    pub cache_ttl_secs: u64,
}

impl LmsConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("LMS_BASE_URL")
                .unwrap_or_else(|_| "https://rest.myabsorb.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: env_opt("LMS_API_KEY").unwrap_or_default(),
            private_key: env_opt("LMS_PRIVATE_KEY").unwrap_or_default(),
            timeout_secs: env_parse("LMS_TIMEOUT_SECS", 30),
            concurrency: env_parse("LMS_CONCURRENCY", 16).max(1),
            cache_ttl_secs: env_parse("CACHE_TTL_SECS", 300),
        }
    }

    /// True when the API key and private key are both present
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.private_key.is_empty()
    }
}
