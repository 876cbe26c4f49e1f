//! Engagement status labels

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

use super::format::parse_lms_date;
use crate::services::lms::Enrollment;

/// Status label shown next to each student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudentStatus {
    Complete,
    Active,
    Warning,
    ReEngage,
    Abandoned,
    CourseExpired,
}

impl StudentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StudentStatus::Complete => "COMPLETE",
            StudentStatus::Active => "ACTIVE",
            StudentStatus::Warning => "WARNING",
            StudentStatus::ReEngage => "RE-ENGAGE",
            StudentStatus::Abandoned => "ABANDONED",
            StudentStatus::CourseExpired => "COURSE EXPIRED",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            StudentStatus::Complete => "blue",
            StudentStatus::Active => "green",
            StudentStatus::Warning => "orange",
            StudentStatus::ReEngage => "red",
            StudentStatus::Abandoned => "gray",
            StudentStatus::CourseExpired => "expired",
        }
    }

    /// Default table order, lowest first
    pub fn priority(&self) -> u8 {
        match self {
            StudentStatus::Complete => 0,
            StudentStatus::Active => 1,
            StudentStatus::Warning => 2,
            StudentStatus::ReEngage => 3,
            StudentStatus::Abandoned => 4,
            StudentStatus::CourseExpired => 5,
        }
    }

    /// Parse a label as sent by the client filter (case-insensitive)
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_uppercase().replace('_', "-");
        [
            StudentStatus::Complete,
            StudentStatus::Active,
            StudentStatus::Warning,
            StudentStatus::ReEngage,
            StudentStatus::Abandoned,
            StudentStatus::CourseExpired,
        ]
        .into_iter()
        .find(|s| s.label() == normalized || s.label().replace(' ', "-") == normalized)
    }
}

#[derive(Serialize)]
struct StatusInfo {
    status: &'static str,
    class: &'static str,
    priority: u8,
}

impl Serialize for StudentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StatusInfo {
            status: self.label(),
            class: self.css_class(),
            priority: self.priority(),
        }
        .serialize(serializer)
    }
}

/// Map elapsed time since the last login to a label.
/// A login in the future counts as active.
pub fn classify_elapsed(elapsed: Duration) -> StudentStatus {
    if elapsed < Duration::hours(24) {
        StudentStatus::Active
    } else if elapsed < Duration::hours(72) {
        StudentStatus::Warning
    } else if elapsed < Duration::days(7) {
        StudentStatus::ReEngage
    } else {
        StudentStatus::Abandoned
    }
}

/// Login-recency status. Missing or unparseable timestamps are abandoned.
pub fn status_from_last_login(last_login: Option<&str>, now: DateTime<Utc>) -> StudentStatus {
    match last_login.and_then(parse_lms_date) {
        Some(dt) => classify_elapsed(now - dt),
        None => StudentStatus::Abandoned,
    }
}

/// True when the primary enrollment is expired by status code or by its expiry date
pub fn is_enrollment_expired(
    enrollment_status: i64,
    primary: Option<&Enrollment>,
    now: DateTime<Utc>,
) -> bool {
    if enrollment_status == 4 {
        return true;
    }
    primary
        .and_then(|e| e.date_expired.as_deref())
        .and_then(parse_lms_date)
        .is_some_and(|expiry| expiry < now)
}

/// Status shown in tables: completion wins, then expiry, then login recency
pub fn display_status(
    progress: f64,
    expired: bool,
    last_login: Option<&str>,
    now: DateTime<Utc>,
) -> StudentStatus {
    if progress >= 100.0 {
        StudentStatus::Complete
    } else if expired {
        StudentStatus::CourseExpired
    } else {
        status_from_last_login(last_login, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn login_ago(d: Duration) -> String {
        (now() - d).to_rfc3339()
    }

    #[test]
    fn test_boundary_23h59m_is_active() {
        let ts = login_ago(Duration::hours(23) + Duration::minutes(59));
        assert_eq!(status_from_last_login(Some(&ts), now()), StudentStatus::Active);
    }

    #[test]
    fn test_boundary_24h_is_warning() {
        let ts = login_ago(Duration::hours(24));
        assert_eq!(status_from_last_login(Some(&ts), now()), StudentStatus::Warning);
    }

    #[test]
    fn test_boundary_71h59m_is_warning() {
        let ts = login_ago(Duration::hours(71) + Duration::minutes(59));
        assert_eq!(status_from_last_login(Some(&ts), now()), StudentStatus::Warning);
    }

    #[test]
    fn test_boundary_72h_is_reengage() {
        let ts = login_ago(Duration::hours(72));
        assert_eq!(status_from_last_login(Some(&ts), now()), StudentStatus::ReEngage);
    }

    #[test]
    fn test_week_old_login_is_abandoned() {
        let ts = login_ago(Duration::days(7));
        assert_eq!(status_from_last_login(Some(&ts), now()), StudentStatus::Abandoned);
    }

    #[test]
    fn test_missing_or_bad_login_is_abandoned() {
        assert_eq!(status_from_last_login(None, now()), StudentStatus::Abandoned);
        assert_eq!(
            status_from_last_login(Some("yesterday-ish"), now()),
            StudentStatus::Abandoned
        );
    }

    #[test]
    fn test_future_login_is_active() {
        let ts = (now() + Duration::hours(2)).to_rfc3339();
        assert_eq!(status_from_last_login(Some(&ts), now()), StudentStatus::Active);
    }

    #[test]
    fn test_display_status_precedence() {
        let old = login_ago(Duration::days(30));
        assert_eq!(
            display_status(100.0, true, Some(&old), now()),
            StudentStatus::Complete
        );
        assert_eq!(
            display_status(50.0, true, Some(&old), now()),
            StudentStatus::CourseExpired
        );
        assert_eq!(
            display_status(50.0, false, Some(&old), now()),
            StudentStatus::Abandoned
        );
    }

    #[test]
    fn test_expiry_by_status_and_date() {
        assert!(is_enrollment_expired(4, None, now()));
        assert!(!is_enrollment_expired(1, None, now()));

        let past = Enrollment {
            date_expired: Some("2025-01-01T00:00:00".to_string()),
            ..Default::default()
        };
        assert!(is_enrollment_expired(1, Some(&past), now()));

        let future = Enrollment {
            date_expired: Some("2026-01-01T00:00:00".to_string()),
            ..Default::default()
        };
        assert!(!is_enrollment_expired(1, Some(&future), now()));
    }

    #[test]
    fn test_serializes_as_status_object() {
        let value = serde_json::to_value(StudentStatus::ReEngage).unwrap();
        assert_eq!(value["status"], "RE-ENGAGE");
        assert_eq!(value["class"], "red");
        assert_eq!(value["priority"], 3);
    }

    #[test]
    fn test_from_label() {
        assert_eq!(StudentStatus::from_label("re-engage"), Some(StudentStatus::ReEngage));
        assert_eq!(
            StudentStatus::from_label("course expired"),
            Some(StudentStatus::CourseExpired)
        );
        assert_eq!(
            StudentStatus::from_label("COURSE_EXPIRED"),
            Some(StudentStatus::CourseExpired)
        );
        assert_eq!(StudentStatus::from_label("bogus"), None);
    }
}
