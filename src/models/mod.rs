pub mod allowed_user;
pub mod contact_override;
pub mod exam_override;
pub mod session;
pub mod study_snapshot;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::allowed_user::{self, Entity as AllowedUser};
    pub use super::contact_override::{self, Entity as ContactOverride};
    pub use super::exam_override::{self, Entity as ExamOverride};
    pub use super::session::{self, Entity as Session};
    pub use super::study_snapshot::{self, Entity as StudySnapshot};
}
