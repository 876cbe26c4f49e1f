//! Pure computations over LMS data: status labels, readiness, course
//! grouping, study gaps, display formatting and the student table.

pub mod courses;
pub mod format;
pub mod gaps;
pub mod readiness;
pub mod status;
pub mod table;

pub use readiness::{calculate_readiness, Readiness, ReadinessStatus};
pub use status::StudentStatus;
pub use table::{StudentQuery, Summary};
