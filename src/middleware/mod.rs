pub mod auth;
pub mod rate_limit;
pub mod security_headers;

pub use auth::{require_admin, require_auth, AuthSession};
pub use rate_limit::limit_login;
pub use security_headers::security_headers;
