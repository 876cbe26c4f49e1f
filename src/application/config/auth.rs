use super::{env_flag, env_opt, env_parse};

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Lifetime of a dashboard session; matches the LMS token lifetime
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    /// Admin password (plain text or a bcrypt hash). Admin features are off when unset.
    pub admin_password: Option<String>,
    /// Login attempts allowed per client per minute
    pub login_rate_limit_per_minute: u32,
    /// Take the client address from `X-Forwarded-For` (only behind a trusted proxy)
    pub trust_proxy_headers: bool,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            session_ttl_hours: env_parse("SESSION_TTL_HOURS", 4),
            cookie_secure: env_flag("SESSION_COOKIE_SECURE", false),
            admin_password: env_opt("DASHBOARD_ADMIN_PASSWORD"),
            login_rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", 10),
            trust_proxy_headers: env_flag("TRUST_PROXY_HEADERS", false),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 4,
            cookie_secure: false,
            admin_password: None,
            login_rate_limit_per_minute: 10,
            trust_proxy_headers: false,
        }
    }
}
