//! Shared fixtures for the HTTP integration tests.
//!
//! The LMS, the exam sheet and the sheet writer are replaced by in-process
//! fakes; the database is an in-memory SQLite with migrations applied.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;

use agency_dashboard::config::{sync::SyncConfig, Config};
use agency_dashboard::db::{connect_with_url, DbConn};
use agency_dashboard::endpoints::create_router;
use agency_dashboard::services::lms::{Department, Enrollment, LmsApi, LmsError, LmsUser, UserUpdate};
use agency_dashboard::services::sheets::{SheetError, SheetSource};
use agency_dashboard::services::sheets_writer::SheetWriter;
use agency_dashboard::state::{AppState, Integrations};

pub const DEPT_ID: &str = "63CADAFD-668F-4738-A273-B9FD02A79BF5";
pub const BROKEN_DEPT_ID: &str = "00000000-0000-0000-0000-000000000500";
pub const DEPT_NAME: &str = "North Agency";
/// Child of DEPT_ID; its members appear in the parent's user listing
pub const SUB_DEPT_ID: &str = "7A1E0C52-3B4D-4F6A-9C8E-2D5B7F901234";
pub const SUB_DEPT_NAME: &str = "North Agency - Columbus";
pub const USERNAME: &str = "manager@agency.com";
pub const PASSWORD: &str = "correct-horse";
pub const TOKEN: &str = "lms-token-1";
pub const ADMIN_PASSWORD: &str = "admin-pass";

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DbConn {
    connect_with_url("sqlite::memory:")
        .await
        .expect("Failed to create test database")
}

fn hours_ago(hours: i64) -> String {
    (Utc::now() - Duration::hours(hours))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

fn user(id: &str, first: &str, last: &str, last_login: Option<String>) -> LmsUser {
    LmsUser {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{}@example.com", first.to_lowercase()),
        username: first.to_lowercase(),
        phone: "555-0100".to_string(),
        last_login,
        department_id: DEPT_ID.to_string(),
    }
}

fn course(name: &str, status: i64, progress: f64, minutes: i64) -> Enrollment {
    Enrollment {
        id: Some(format!("e-{}", name.len())),
        course_name: name.to_string(),
        status,
        progress,
        time_spent: minutes,
        date_started: Some("2025-01-06T10:00:00".to_string()),
        ..Default::default()
    }
}

/// In-memory LMS with three students:
/// Ann (active, 60%), Bob (re-engage, 20%) and Cara (never logged in, complete)
pub struct FakeLms {
    users: Vec<LmsUser>,
    enrollments: HashMap<String, Vec<Enrollment>>,
    pub updates: Mutex<Vec<(String, UserUpdate)>>,
}

impl FakeLms {
    pub fn new() -> Self {
        let users = vec![
            LmsUser {
                department_id: SUB_DEPT_ID.to_string(),
                ..user("u-ann", "Ann", "Lee", Some(hours_ago(2)))
            },
            user("u-bob", "Bob", "Stone", Some(hours_ago(96))),
            user("u-cara", "Cara", "Diaz", None),
        ];
        let mut enrollments = HashMap::new();
        enrollments.insert(
            "u-ann".to_string(),
            vec![
                course("Ohio Life & Health Pre-Licensing Course", 1, 60.0, 600),
                course("Life Practice Exam", 2, 85.0, 45),
            ],
        );
        enrollments.insert(
            "u-bob".to_string(),
            vec![course("Ohio Life Pre-Licensing Course", 1, 20.0, 120)],
        );
        enrollments.insert(
            "u-cara".to_string(),
            vec![course("Ohio Health Pre-Licensing Course", 2, 100.0, 1500)],
        );
        Self {
            users,
            enrollments,
            updates: Mutex::new(Vec::new()),
        }
    }

    fn check(&self, token: &str) -> Result<(), LmsError> {
        if token == TOKEN {
            Ok(())
        } else {
            Err(LmsError::Unauthorized)
        }
    }
}

#[async_trait]
impl LmsApi for FakeLms {
    async fn authenticate(&self, _username: &str, password: &str) -> Result<String, LmsError> {
        if password == PASSWORD {
            Ok(TOKEN.to_string())
        } else {
            Err(LmsError::InvalidCredentials)
        }
    }

    async fn get_department(&self, token: &str, department_id: &str) -> Result<Department, LmsError> {
        self.check(token)?;
        let name = if department_id.eq_ignore_ascii_case(SUB_DEPT_ID) {
            SUB_DEPT_NAME
        } else {
            DEPT_NAME
        };
        Ok(Department {
            id: department_id.to_string(),
            name: name.to_string(),
        })
    }

    async fn list_department_users(
        &self,
        token: &str,
        department_id: &str,
    ) -> Result<Vec<LmsUser>, LmsError> {
        self.check(token)?;
        if department_id.eq_ignore_ascii_case(DEPT_ID) {
            Ok(self.users.clone())
        } else if department_id == BROKEN_DEPT_ID {
            Err(LmsError::Upstream {
                status: 500,
                message: "department listing failed".to_string(),
            })
        } else {
            Ok(Vec::new())
        }
    }

    async fn get_user(&self, token: &str, user_id: &str) -> Result<LmsUser, LmsError> {
        self.check(token)?;
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| LmsError::NotFound("User not found".to_string()))
    }

    async fn update_user(
        &self,
        token: &str,
        user_id: &str,
        update: &UserUpdate,
    ) -> Result<LmsUser, LmsError> {
        self.check(token)?;
        self.updates.lock().push((user_id.to_string(), update.clone()));
        self.get_user(token, user_id).await
    }

    async fn find_user_by_email(
        &self,
        token: &str,
        email: &str,
        _name_hint: Option<&str>,
    ) -> Result<Option<LmsUser>, LmsError> {
        self.check(token)?;
        Ok(self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_enrollments(&self, token: &str, user_id: &str) -> Result<Vec<Enrollment>, LmsError> {
        self.check(token)?;
        Ok(self.enrollments.get(user_id).cloned().unwrap_or_default())
    }
}

/// Exam sheet with one department student (Ann) and one outsider (Zed)
pub const EXAM_CSV: &str = "Student Name,Email,Phone,Exam Date,Exam Time,State,Course,Agency Owner,Pass/Fail,Final Outcome\n\
Ann Lee,ANN@example.com,555-0100,12/31/2099,9:00 AM,OH,Life & Health,Bo,,\n\
Zed Park,zed@example.com,555-0199,1/15/2099,1:00 PM,OH,Life,Bo,,\n";

pub struct StaticSheet(pub String);

#[async_trait]
impl SheetSource for StaticSheet {
    async fn fetch_csv(&self) -> Result<String, SheetError> {
        Ok(self.0.clone())
    }
}

/// Records write-back calls instead of talking to Google
pub struct FakeWriter {
    pub configured: bool,
    pub writes: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeWriter {
    pub fn new(configured: bool) -> Self {
        Self {
            configured,
            writes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SheetWriter for FakeWriter {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn update_exam_row(&self, email: &str, fields: &[(&str, String)]) -> Result<usize, SheetError> {
        let fields: Vec<(String, String)> = fields
            .iter()
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect();
        let count = fields.len();
        self.writes.lock().push((email.to_string(), fields));
        Ok(count)
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub lms: Arc<FakeLms>,
    pub writer: Arc<FakeWriter>,
    pub static_dir: PathBuf,
}

fn test_config() -> Config {
    let mut config = Config::from_env();
    config.auth.admin_password = Some(ADMIN_PASSWORD.to_string());
    config.auth.login_rate_limit_per_minute = 10;
    config.auth.session_ttl_hours = 4;
    config.sync = SyncConfig::default();
    config
}

/// Frontend directory holding a single index.html
fn create_static_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("agency-dashboard-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "<!doctype html><title>Dashboard</title>").unwrap();
    dir
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_config(test_config()).await
}

pub async fn create_test_app_with_config(config: Config) -> TestApp {
    let db = create_test_db().await;
    let lms = Arc::new(FakeLms::new());
    let writer = Arc::new(FakeWriter::new(true));
    let integrations = Integrations {
        lms: lms.clone(),
        sheet_source: Arc::new(StaticSheet(EXAM_CSV.to_string())),
        sheet_writer: writer.clone(),
    };
    let state = AppState::new(db, integrations, &config);
    let static_dir = create_static_dir();
    let router = create_router(state.clone(), &static_dir);

    TestApp {
        router,
        state,
        lms,
        writer,
        static_dir,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("response is not JSON ({}): {}", e, self.body))
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).to_string(),
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send(request("GET", uri, cookie, None)).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.send(request("POST", uri, cookie, Some(body))).await
    }

    pub async fn put(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.send(request("PUT", uri, cookie, Some(body))).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send(request("DELETE", uri, cookie, None)).await
    }

    /// Log in as the department manager and return the Cookie header value
    pub async fn login(&self) -> String {
        let response = self
            .post(
                "/api/auth/login",
                None,
                serde_json::json!({
                    "username": USERNAME,
                    "password": PASSWORD,
                    "departmentId": DEPT_ID,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        session_cookie(&response.headers).expect("login did not set a session cookie")
    }

    /// Log in and pass the admin password check
    pub async fn login_admin(&self) -> String {
        let cookie = self.login().await;
        let response = self
            .post(
                "/api/auth/admin",
                Some(&cookie),
                serde_json::json!({ "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "admin check failed: {}", response.body);
        cookie
    }
}

/// `name=value` part of the Set-Cookie header
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(|s| s.trim().to_string())
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
