//! LMS REST client
//!
//! Wraps the learning-management system's REST API: credential exchange,
//! department-scoped user listing with offset pagination, user lookup and
//! update, and per-user enrollments. The API is inconsistent about key casing
//! (`courseName` vs `CourseName`), so records are read from raw JSON with
//! ordered key fallbacks instead of serde derives.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::analytics::format::parse_time_value;
use crate::config::lms::LmsConfig;

const USER_PAGE_SIZE: usize = 500;
const ENROLLMENT_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum LmsError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("LMS session expired")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("LMS returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("LMS request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected LMS response: {0}")]
    Decode(String),

    #[error("LMS API credentials are not configured")]
    NotConfigured,
}

// ============================================================================
// Records
// ============================================================================

/// First present, non-empty value among `keys`
fn field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| obj.get(*k)).find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    field(obj, keys).map(|v| match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

fn num_field(obj: &Value, keys: &[&str]) -> Option<f64> {
    field(obj, keys).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Pull a record list out of either a bare array or a wrapping object
fn extract_list(data: Value, keys: &[&str]) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Object(mut map) => keys
            .iter()
            .find_map(|k| match map.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// An LMS user account
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LmsUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub phone: String,
    pub last_login: Option<String>,
    pub department_id: String,
}

impl LmsUser {
    /// Parse a user record; records without an id are rejected
    pub fn from_value(v: &Value) -> Option<Self> {
        Some(Self {
            id: str_field(v, &["id", "Id"])?,
            first_name: str_field(v, &["firstName", "FirstName"]).unwrap_or_default(),
            last_name: str_field(v, &["lastName", "LastName"]).unwrap_or_default(),
            email: str_field(v, &["emailAddress", "EmailAddress"]).unwrap_or_default(),
            username: str_field(v, &["username", "Username"]).unwrap_or_default(),
            phone: str_field(v, &["phone", "Phone"]).unwrap_or_default(),
            last_login: str_field(
                v,
                &["lastLoginDate", "LastLoginDate", "dateLastAccessed", "DateLastAccessed"],
            ),
            department_id: str_field(v, &["departmentId", "DepartmentId"]).unwrap_or_default(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// A user's enrollment in one course
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: Option<String>,
    pub course_id: Option<String>,
    pub course_name: String,
    /// 0 not started, 1 in progress, 2/3 complete, 4 expired
    pub status: i64,
    pub progress: f64,
    pub score: Option<f64>,
    /// Whole minutes
    pub time_spent: i64,
    pub date_started: Option<String>,
    pub date_completed: Option<String>,
    pub date_edited: Option<String>,
    pub date_added: Option<String>,
    pub access_date: Option<String>,
    pub date_expired: Option<String>,
}

impl Enrollment {
    pub fn from_value(v: &Value) -> Self {
        Self {
            id: str_field(v, &["id", "Id"]),
            course_id: str_field(v, &["courseId", "CourseId"]),
            course_name: str_field(v, &["courseName", "CourseName"]).unwrap_or_default(),
            status: num_field(v, &["status", "Status"]).unwrap_or(0.0) as i64,
            progress: num_field(v, &["progress", "Progress"]).unwrap_or(0.0),
            score: num_field(v, &["score", "Score"]),
            time_spent: field(v, &["timeSpent", "TimeSpent", "activeTime", "ActiveTime"])
                .map(parse_time_value)
                .unwrap_or(0),
            date_started: str_field(v, &["dateStarted", "DateStarted"]),
            date_completed: str_field(v, &["dateCompleted", "DateCompleted"]),
            date_edited: str_field(v, &["dateEdited", "DateEdited"]),
            date_added: str_field(v, &["dateAdded", "DateAdded"]),
            access_date: str_field(v, &["accessDate", "AccessDate"]),
            date_expired: str_field(
                v,
                &[
                    "dateExpired",
                    "DateExpired",
                    "expiryDate",
                    "ExpiryDate",
                    "dateExpiry",
                    "DateExpiry",
                    "expiredDate",
                    "ExpiredDate",
                ],
            ),
        }
    }

    /// Most meaningful date for recency ordering
    pub fn activity_date(&self) -> &str {
        self.date_completed
            .as_deref()
            .or(self.date_edited.as_deref())
            .or(self.date_started.as_deref())
            .or(self.date_added.as_deref())
            .unwrap_or("")
    }

    /// Last time the student touched the course
    pub fn last_accessed(&self) -> Option<&str> {
        self.access_date
            .as_deref()
            .or(self.date_edited.as_deref())
            .or(self.date_started.as_deref())
    }

    /// Score of a practice attempt, falling back to progress when unscored
    pub fn practice_score(&self) -> f64 {
        self.score.unwrap_or(self.progress)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, 2 | 3)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Department {
    pub id: String,
    pub name: String,
}

impl Department {
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Department".to_string(),
        }
    }
}

/// Profile fields that may be pushed back to the LMS
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email_address.is_none()
            && self.phone.is_none()
    }
}

// ============================================================================
// API trait
// ============================================================================

/// Operations the dashboard needs from the LMS
#[async_trait]
pub trait LmsApi: Send + Sync {
    /// Exchange credentials for an API token
    async fn authenticate(&self, username: &str, password: &str) -> Result<String, LmsError>;

    async fn get_department(&self, token: &str, department_id: &str)
        -> Result<Department, LmsError>;

    /// All users in a department (and its sub-departments)
    async fn list_department_users(
        &self,
        token: &str,
        department_id: &str,
    ) -> Result<Vec<LmsUser>, LmsError>;

    async fn get_user(&self, token: &str, user_id: &str) -> Result<LmsUser, LmsError>;

    async fn update_user(
        &self,
        token: &str,
        user_id: &str,
        update: &UserUpdate,
    ) -> Result<LmsUser, LmsError>;

    /// Locate a user anywhere in the tenant by exact email
    async fn find_user_by_email(
        &self,
        token: &str,
        email: &str,
        name_hint: Option<&str>,
    ) -> Result<Option<LmsUser>, LmsError>;

    async fn get_enrollments(&self, token: &str, user_id: &str)
        -> Result<Vec<Enrollment>, LmsError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct LmsClient {
    http: reqwest::Client,
    config: LmsConfig,
}

impl LmsClient {
    pub fn new(config: LmsConfig) -> Result<Self, LmsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.concurrency)
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header("x-api-key", &self.config.api_key)
            .header("Accept", "application/json");
        match token {
            // The LMS expects the raw token, no Bearer prefix
            Some(t) => builder.header("Authorization", t),
            None => builder,
        }
    }

    /// Map non-success statuses to typed errors
    async fn check(resp: reqwest::Response, context: &str) -> Result<reqwest::Response, LmsError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message: String = body.chars().take(200).collect();
        Err(match status {
            StatusCode::UNAUTHORIZED => LmsError::Unauthorized,
            StatusCode::NOT_FOUND => LmsError::NotFound(format!("{} not found", context)),
            StatusCode::BAD_REQUEST => LmsError::BadRequest(if message.is_empty() {
                format!("Invalid request for {}", context)
            } else {
                message
            }),
            other => LmsError::Upstream {
                status: other.as_u16(),
                message: format!("{}: {}", context, message),
            },
        })
    }

    async fn json(resp: reqwest::Response) -> Result<Value, LmsError> {
        resp.json::<Value>()
            .await
            .map_err(|e| LmsError::Decode(e.to_string()))
    }

    /// `/users` search returning matching records
    async fn search_users(
        &self,
        token: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<LmsUser>, LmsError> {
        let resp = self
            .request(reqwest::Method::GET, "users", Some(token))
            .query(params)
            .send()
            .await?;
        let resp = Self::check(resp, "user search").await?;
        let data = Self::json(resp).await?;
        Ok(extract_list(data, &["users", "Users"])
            .iter()
            .filter_map(LmsUser::from_value)
            .collect())
    }
}

fn match_email(users: Vec<LmsUser>, email: &str) -> Option<LmsUser> {
    users
        .into_iter()
        .find(|u| u.email.trim().eq_ignore_ascii_case(email))
}

#[async_trait]
impl LmsApi for LmsClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<String, LmsError> {
        if !self.config.is_configured() {
            return Err(LmsError::NotConfigured);
        }

        let payload = serde_json::json!({
            "Username": username,
            "Password": password,
            "PrivateKey": self.config.private_key,
        });

        let resp = self
            .request(reqwest::Method::POST, "Authenticate", None)
            .json(&payload)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let body = resp.text().await?;
                let token = body.trim().trim_matches('"').to_string();
                if token.is_empty() {
                    return Err(LmsError::Decode("empty authentication token".to_string()));
                }
                Ok(token)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(LmsError::InvalidCredentials),
            other => {
                let body = resp.text().await.unwrap_or_default();
                Err(LmsError::Upstream {
                    status: other.as_u16(),
                    message: format!("Authentication failed: {}", body.chars().take(200).collect::<String>()),
                })
            }
        }
    }

    async fn get_department(
        &self,
        token: &str,
        department_id: &str,
    ) -> Result<Department, LmsError> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("Departments/{}", urlencoding::encode(department_id)),
                Some(token),
            )
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let data = Self::json(resp).await?;
                Ok(Department {
                    id: department_id.to_string(),
                    name: str_field(&data, &["name", "Name"])
                        .unwrap_or_else(|| "Department".to_string()),
                })
            }
            StatusCode::UNAUTHORIZED => Err(LmsError::Unauthorized),
            status => {
                tracing::debug!(department_id, status = status.as_u16(), "Department lookup failed");
                Ok(Department::placeholder(department_id))
            }
        }
    }

    async fn list_department_users(
        &self,
        token: &str,
        department_id: &str,
    ) -> Result<Vec<LmsUser>, LmsError> {
        let filter = format!("departmentId eq guid'{}'", department_id);
        let mut users = Vec::new();
        let mut offset = 0usize;

        loop {
            let resp = self
                .request(reqwest::Method::GET, "users", Some(token))
                .query(&[
                    ("_filter", filter.clone()),
                    ("_limit", USER_PAGE_SIZE.to_string()),
                    ("_offset", offset.to_string()),
                ])
                .send()
                .await?;
            let resp = Self::check(resp, "department users").await?;
            let page = extract_list(Self::json(resp).await?, &["users", "Users"]);
            let page_len = page.len();

            users.extend(page.iter().filter_map(LmsUser::from_value));
            tracing::debug!(department_id, offset, page_len, total = users.len(), "Fetched user page");

            if page_len < USER_PAGE_SIZE {
                break;
            }
            offset += USER_PAGE_SIZE;
        }

        tracing::info!(department_id, count = users.len(), "Listed department users");
        Ok(users)
    }

    async fn get_user(&self, token: &str, user_id: &str) -> Result<LmsUser, LmsError> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("users/{}", urlencoding::encode(user_id)),
                Some(token),
            )
            .send()
            .await?;
        let resp = Self::check(resp, &format!("User {}", user_id)).await?;
        let data = Self::json(resp).await?;
        LmsUser::from_value(&data).ok_or_else(|| LmsError::Decode("user record without id".to_string()))
    }

    async fn update_user(
        &self,
        token: &str,
        user_id: &str,
        update: &UserUpdate,
    ) -> Result<LmsUser, LmsError> {
        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("users/{}", urlencoding::encode(user_id)),
                Some(token),
            )
            .json(update)
            .send()
            .await?;
        let resp = Self::check(resp, &format!("User {}", user_id)).await?;
        let data = Self::json(resp).await?;

        // Some tenants answer with an empty object; fall back to a fresh read
        match LmsUser::from_value(&data) {
            Some(user) => Ok(user),
            None => self.get_user(token, user_id).await,
        }
    }

    async fn find_user_by_email(
        &self,
        token: &str,
        email: &str,
        name_hint: Option<&str>,
    ) -> Result<Option<LmsUser>, LmsError> {
        let email = email.trim().to_lowercase();

        // Name search is the most reliable: the LMS search matches name fields
        let last_name = name_hint
            .and_then(|hint| hint.split_whitespace().last())
            .filter(|n| n.chars().count() >= 2);
        if let Some(last_name) = last_name {
            match self
                .search_users(token, &[("_search", last_name.to_string()), ("_limit", "100".to_string())])
                .await
            {
                Ok(users) => {
                    if let Some(user) = match_email(users, &email) {
                        return Ok(Some(user));
                    }
                }
                Err(LmsError::Unauthorized) => return Err(LmsError::Unauthorized),
                Err(e) => tracing::debug!(email = %email, error = %e, "Name search failed"),
            }
        }

        match self
            .search_users(token, &[("_search", email.clone()), ("_limit", "50".to_string())])
            .await
        {
            Ok(users) => {
                if let Some(user) = match_email(users, &email) {
                    return Ok(Some(user));
                }
            }
            Err(LmsError::Unauthorized) => return Err(LmsError::Unauthorized),
            Err(e) => tracing::debug!(email = %email, error = %e, "Email search failed"),
        }

        let users = self
            .search_users(
                token,
                &[
                    ("_filter", format!("emailAddress eq '{}'", email.replace('\'', "''"))),
                    ("_limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(match_email(users, &email))
    }

    async fn get_enrollments(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Vec<Enrollment>, LmsError> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("users/{}/enrollments", urlencoding::encode(user_id)),
                Some(token),
            )
            .query(&[("_limit", ENROLLMENT_LIMIT.to_string())])
            .send()
            .await?;
        let resp = Self::check(resp, &format!("Enrollments for {}", user_id)).await?;
        let data = Self::json(resp).await?;
        Ok(extract_list(data, &["enrollments", "Enrollments"])
            .iter()
            .map(Enrollment::from_value)
            .collect())
    }
}
