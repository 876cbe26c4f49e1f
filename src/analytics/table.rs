//! Student table: filtering, sorting, KPI summary and CSV export

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::courses::CourseCategory;
use super::format::{format_progress, parse_lms_date, round1};
use super::status::StudentStatus;
use crate::error::{AppError, Result};
use crate::services::roster::StudentRecord;

pub const CSV_HEADER: [&str; 9] = [
    "First Name",
    "Last Name",
    "Email",
    "Phone",
    "Status",
    "Last Login",
    "Course",
    "Progress (%)",
    "Time Spent (minutes)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Name,
    Email,
    Status,
    LastLogin,
    Progress,
    TimeSpent,
    #[serde(alias = "examPrep")]
    ExamPrepTime,
    #[serde(alias = "courseName")]
    Course,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Query string accepted by the student list and export endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub sort: Option<SortKey>,
    pub order: Option<SortOrder>,
}

/// Parsed filters. `None` means "no restriction".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentFilter {
    pub search: Option<String>,
    pub status: Option<StudentStatus>,
    pub category: Option<CourseCategory>,
}

fn filter_value(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

impl StudentQuery {
    pub fn filter(&self) -> Result<StudentFilter> {
        let status = match filter_value(&self.status) {
            Some(label) => Some(StudentStatus::from_label(label).ok_or_else(|| {
                AppError::Validation(format!("status: unknown status '{}'", label))
            })?),
            None => None,
        };
        let category = match filter_value(&self.category) {
            Some(raw) => Some(
                serde_json::from_value::<CourseCategory>(serde_json::Value::String(raw.to_lowercase()))
                    .map_err(|_| AppError::Validation(format!("category: unknown category '{}'", raw)))?,
            ),
            None => None,
        };
        Ok(StudentFilter {
            search: filter_value(&self.search).map(str::to_lowercase),
            status,
            category,
        })
    }
}

/// A student with the values the table filters and sorts on
#[derive(Debug, Clone)]
pub struct TableRow<'a> {
    pub record: &'a StudentRecord,
    pub status: StudentStatus,
    pub category: CourseCategory,
    pub last_login: Option<DateTime<Utc>>,
    pub progress: f64,
}

impl<'a> TableRow<'a> {
    pub fn new(record: &'a StudentRecord, now: DateTime<Utc>) -> Self {
        Self {
            record,
            status: record.status(now),
            category: CourseCategory::of(&record.course_name),
            last_login: record.user.last_login.as_deref().and_then(parse_lms_date),
            progress: format_progress(record.progress).value,
        }
    }

    fn sort_name(&self) -> String {
        self.record.user.full_name().to_lowercase()
    }

    fn matches(&self, filter: &StudentFilter) -> bool {
        if let Some(term) = &filter.search {
            let user = &self.record.user;
            let hit = self.sort_name().contains(term.as_str())
                || user.email.to_lowercase().contains(term.as_str())
                || user.username.to_lowercase().contains(term.as_str());
            if !hit {
                return false;
            }
        }
        if filter.status.is_some_and(|s| s != self.status) {
            return false;
        }
        if filter.category.is_some_and(|c| c != self.category) {
            return false;
        }
        true
    }
}

fn compare(a: &TableRow, b: &TableRow, key: Option<SortKey>) -> Ordering {
    let progress = |a: &TableRow, b: &TableRow| a.progress.total_cmp(&b.progress);
    match key {
        None => a
            .status
            .priority()
            .cmp(&b.status.priority())
            .then_with(|| progress(b, a)),
        Some(SortKey::Name) => a.sort_name().cmp(&b.sort_name()),
        Some(SortKey::Email) => a
            .record
            .user
            .email
            .to_lowercase()
            .cmp(&b.record.user.email.to_lowercase()),
        Some(SortKey::Status) => a.status.priority().cmp(&b.status.priority()),
        Some(SortKey::LastLogin) => a.last_login.cmp(&b.last_login),
        Some(SortKey::Progress) => progress(a, b),
        Some(SortKey::TimeSpent) => a.record.time_spent.cmp(&b.record.time_spent),
        Some(SortKey::ExamPrepTime) => a.record.exam_prep_minutes.cmp(&b.record.exam_prep_minutes),
        Some(SortKey::Course) => a
            .record
            .course_name
            .to_lowercase()
            .cmp(&b.record.course_name.to_lowercase()),
    }
}

/// Stable sort. Descending reverses the comparator, so ties keep their input order.
pub fn sort_rows(rows: &mut [TableRow], key: Option<SortKey>, order: SortOrder) {
    rows.sort_by(|a, b| {
        let ord = compare(a, b, key);
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

/// Filter and sort a roster for display
pub fn build_table<'a>(
    students: &'a [StudentRecord],
    query: &StudentQuery,
    now: DateTime<Utc>,
) -> Result<Vec<TableRow<'a>>> {
    let filter = query.filter()?;
    let mut rows: Vec<TableRow> = students
        .iter()
        .map(|s| TableRow::new(s, now))
        .filter(|row| row.matches(&filter))
        .collect();
    sort_rows(&mut rows, query.sort, query.order.unwrap_or_default());
    Ok(rows)
}

/// Dashboard KPI cards
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_students: usize,
    pub active_count: usize,
    pub warning_count: usize,
    /// Everyone past the warning window, abandoned included
    pub reengage_count: usize,
    pub complete_count: usize,
    pub expired_count: usize,
    pub average_progress: f64,
}

/// Login-recency counts cover every student; complete and expired are counted separately.
pub fn summarize(students: &[StudentRecord], now: DateTime<Utc>) -> Summary {
    let mut summary = Summary {
        total_students: students.len(),
        ..Default::default()
    };
    let mut total_progress = 0.0;

    for student in students {
        match student.login_status(now) {
            StudentStatus::Active => summary.active_count += 1,
            StudentStatus::Warning => summary.warning_count += 1,
            _ => summary.reengage_count += 1,
        }
        match student.status(now) {
            StudentStatus::Complete => summary.complete_count += 1,
            StudentStatus::CourseExpired => summary.expired_count += 1,
            _ => {}
        }
        total_progress += student.progress;
    }

    if !students.is_empty() {
        summary.average_progress = round1(total_progress / students.len() as f64);
    }
    summary
}

/// Render rows as CSV with a header line
pub fn export_csv(rows: &[TableRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| AppError::Internal(format!("CSV export failed: {}", e));

    writer.write_record(CSV_HEADER).map_err(csv_err)?;
    for row in rows {
        let user = &row.record.user;
        let course = if row.record.course_name.is_empty() {
            "No Course"
        } else {
            row.record.course_name.as_str()
        };
        writer
            .write_record([
                user.first_name.as_str(),
                user.last_name.as_str(),
                user.email.as_str(),
                user.phone.as_str(),
                row.status.label(),
                user.last_login.as_deref().unwrap_or("Never"),
                course,
                &format!("{:.1}", row.progress),
                &row.record.time_spent.to_string(),
            ])
            .map_err(csv_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lms::{Enrollment, LmsUser};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn student(first: &str, email: &str, hours_ago: Option<i64>, progress: f64) -> StudentRecord {
        let user = LmsUser {
            id: email.to_string(),
            first_name: first.to_string(),
            last_name: "Test".to_string(),
            email: email.to_string(),
            last_login: hours_ago.map(|h| (now() - Duration::hours(h)).to_rfc3339()),
            ..Default::default()
        };
        let enrollments = vec![Enrollment {
            course_name: "Life Pre-Licensing Course".to_string(),
            progress,
            status: 1,
            time_spent: (progress as i64) * 10,
            ..Default::default()
        }];
        StudentRecord::from_enrollments(user, enrollments)
    }

    fn roster() -> Vec<StudentRecord> {
        vec![
            student("Ann", "ann@example.com", Some(1), 40.0),
            student("Bob", "bob@example.com", Some(30), 60.0),
            student("Cat", "cat@example.com", Some(100), 20.0),
            student("Dan", "dan@example.com", None, 100.0),
            student("Eve", "eve@example.com", Some(2), 40.0),
        ]
    }

    fn names(rows: &[TableRow]) -> Vec<String> {
        rows.iter().map(|r| r.record.user.first_name.clone()).collect()
    }

    #[test]
    fn test_default_order_priority_then_progress() {
        let students = roster();
        let rows = build_table(&students, &StudentQuery::default(), now()).unwrap();
        assert_eq!(names(&rows), vec!["Dan", "Ann", "Eve", "Bob", "Cat"]);
    }

    #[test]
    fn test_sort_is_stable_in_both_directions() {
        let students = roster();
        let mut query = StudentQuery {
            sort: Some(SortKey::Progress),
            ..Default::default()
        };
        let asc = build_table(&students, &query, now()).unwrap();
        assert_eq!(names(&asc), vec!["Cat", "Ann", "Eve", "Bob", "Dan"]);

        query.order = Some(SortOrder::Desc);
        let desc = build_table(&students, &query, now()).unwrap();
        // Ann and Eve tie on progress and keep their input order
        assert_eq!(names(&desc), vec!["Dan", "Bob", "Ann", "Eve", "Cat"]);
    }

    #[test]
    fn test_search_and_status_filters() {
        let students = roster();
        let query = StudentQuery {
            search: Some("BOB@".to_string()),
            ..Default::default()
        };
        assert_eq!(names(&build_table(&students, &query, now()).unwrap()), vec!["Bob"]);

        let query = StudentQuery {
            status: Some("re-engage".to_string()),
            ..Default::default()
        };
        assert_eq!(names(&build_table(&students, &query, now()).unwrap()), vec!["Cat"]);

        let query = StudentQuery {
            status: Some("all".to_string()),
            category: Some("exam-prep".to_string()),
            ..Default::default()
        };
        assert!(build_table(&students, &query, now()).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        let query = StudentQuery {
            status: Some("sleepy".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.filter(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_summary_counts() {
        let summary = summarize(&roster(), now());
        assert_eq!(summary.total_students, 5);
        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.warning_count, 1);
        assert_eq!(summary.reengage_count, 2);
        assert_eq!(summary.complete_count, 1);
        assert_eq!(summary.expired_count, 0);
        assert_eq!(summary.average_progress, 52.0);
        assert_eq!(summarize(&[], now()), Summary::default());
    }

    #[test]
    fn test_export_row_count_matches_filter() {
        let students = roster();
        let query = StudentQuery {
            search: Some("example.com".to_string()),
            status: Some("ACTIVE".to_string()),
            ..Default::default()
        };
        let rows = build_table(&students, &query, now()).unwrap();
        let csv = export_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), rows.len() + 1);
        assert_eq!(
            lines[0],
            "First Name,Last Name,Email,Phone,Status,Last Login,Course,Progress (%),Time Spent (minutes)"
        );
        assert!(lines[1].starts_with("Ann,Test,ann@example.com,,ACTIVE,"));
        assert!(lines[1].ends_with(",Life Pre-Licensing Course,40.0,400"));
    }
}
