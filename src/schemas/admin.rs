use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddAllowedUser {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub name: Option<String>,
}
