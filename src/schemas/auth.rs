use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::session;

/// Department ids are GUIDs in hyphenated form
pub fn validate_department_id(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.len() == 36 && uuid::Uuid::try_parse(value).is_ok() {
        return Ok(());
    }
    let mut err = ValidationError::new("department_id");
    err.message = Some(
        "Invalid Department ID format. Expected GUID format (e.g., 63CADAFD-668F-4738-A273-B9FD02A79BF5)"
            .into(),
    );
    Err(err)
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 3, max = 254, message = "must be 3-254 characters"))]
    pub username: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
    #[validate(custom(function = "validate_department_id"))]
    pub department_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentInfo {
    pub id: String,
    pub name: String,
}

/// Who is signed in and until when
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: SessionUser,
    pub department: DepartmentInfo,
    pub expires_at: DateTime<Utc>,
    pub is_admin: bool,
}

/// `jane.doe@agency.com` → `Jane.Doe`
fn display_name(username: &str) -> String {
    let local = username.split('@').next().unwrap_or(username);
    local
        .split('.')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(".")
}

impl From<&session::Model> for SessionResponse {
    fn from(s: &session::Model) -> Self {
        let name = display_name(&s.username);
        Self {
            user: SessionUser {
                id: s.username.clone(),
                name: name.clone(),
                email: s.username.clone(),
                first_name: name,
                last_name: String::new(),
            },
            department: DepartmentInfo {
                id: s.department_id.clone(),
                name: s.department_name.clone(),
            },
            expires_at: s.expires_at,
            is_admin: s.is_admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(username: &str, password: &str, department_id: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
            department_id: department_id.to_string(),
        }
    }

    #[test]
    fn test_login_validation() {
        let ok = login("jane@agency.com", "pw", "63CADAFD-668F-4738-A273-B9FD02A79BF5");
        assert!(ok.validate().is_ok());

        let errors = login("ab", "", "not-a-guid").validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("department_id"));
    }

    #[test]
    fn test_department_id_requires_hyphenated_guid() {
        assert!(validate_department_id("63cadafd-668f-4738-a273-b9fd02a79bf5").is_ok());
        assert!(validate_department_id("63cadafd668f4738a273b9fd02a79bf5").is_err());
        assert!(validate_department_id("").is_err());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("jane.doe@agency.com"), "Jane.Doe");
        assert_eq!(display_name("BOB"), "Bob");
    }
}
