pub mod admin;
pub mod auth;
pub mod exam;
pub mod student;

pub use admin::*;
pub use auth::*;
pub use exam::*;
pub use student::*;
