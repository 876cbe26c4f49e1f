use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::student::{LastLogin, Minutes, StudentView};
use crate::analytics::format::{format_progress, ProgressInfo};
use crate::analytics::readiness::{calculate_readiness, ReadinessStatus};
use crate::models::{exam_override, study_snapshot};
use crate::services::roster::StudentRecord;
use crate::services::sheets::{compare_exam_dates, parse_exam_date, ExamRecord, WeeklyTracking};

/// Sheet row with any admin overrides applied. Blank override fields keep the sheet value.
pub fn apply_exam_override(record: &mut ExamRecord, o: &exam_override::Model) {
    if !o.pass_fail.is_empty() {
        record.pass_fail = o.pass_fail.clone();
    }
    if !o.exam_date.is_empty() {
        record.set_exam_date(&o.exam_date);
    }
    if !o.exam_time.is_empty() {
        record.exam_time = o.exam_time.clone();
    }
}

/// An LMS student matched to a sheet row by email
#[derive(Debug, Clone)]
pub struct ExamMatch {
    pub record: Arc<StudentRecord>,
    pub department_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBadge {
    pub status: &'static str,
    pub class: &'static str,
    pub priority: u8,
}

impl StatusBadge {
    pub fn unknown() -> Self {
        Self {
            status: "UNKNOWN",
            class: "gray",
            priority: 99,
        }
    }
}

/// Sheet-only student that could not be found in the LMS
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedStudent {
    pub id: Option<String>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub status: StatusBadge,
    pub last_login: LastLogin,
    pub progress: ProgressInfo,
    pub course_name: String,
    pub time_spent: Minutes,
    pub exam_prep_time: Minutes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExamStudent {
    Matched(StudentView),
    Unmatched(UnmatchedStudent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessBrief {
    pub status: ReadinessStatus,
    pub criteria_met: usize,
    pub criteria_total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamStudentView {
    #[serde(flatten)]
    pub student: ExamStudent,
    pub exam_date: String,
    pub exam_date_raw: String,
    pub exam_time: String,
    pub exam_state: String,
    pub exam_course: String,
    pub agency_owner: String,
    pub pass_fail: String,
    pub final_outcome: String,
    pub alert_date: String,
    pub study_hours_at_exam: String,
    pub final_practice: String,
    pub chapters_complete: String,
    pub videos_watched: String,
    pub state_laws_done: String,
    pub study_consistency: String,
    pub weekly_tracking: Vec<WeeklyTracking>,
    pub department_name: String,
    pub matched: bool,
    pub has_override: bool,
    pub readiness: Option<ReadinessBrief>,
}

impl ExamStudentView {
    pub fn new(
        sheet: ExamRecord,
        matched: Option<&ExamMatch>,
        has_override: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let (student, department_name, readiness) = match matched {
            Some(m) => {
                let days_until = parse_exam_date(&sheet.exam_date)
                    .map(|d| (d - now.date_naive()).num_days());
                let course = Some(sheet.course.as_str()).filter(|c| !c.is_empty());
                let r = calculate_readiness(&m.record.enrollments, course, days_until);
                (
                    ExamStudent::Matched(StudentView::from_record(&m.record, now)),
                    m.department_name.clone(),
                    Some(ReadinessBrief {
                        status: r.status,
                        criteria_met: r.criteria_met,
                        criteria_total: r.criteria_total,
                    }),
                )
            }
            None => (
                ExamStudent::Unmatched(UnmatchedStudent {
                    id: None,
                    full_name: sheet.name.clone(),
                    email: sheet.email.clone(),
                    phone: sheet.phone.clone(),
                    status: StatusBadge::unknown(),
                    last_login: LastLogin::unknown(),
                    progress: format_progress(0.0),
                    course_name: if sheet.course.is_empty() {
                        "N/A".to_string()
                    } else {
                        sheet.course.clone()
                    },
                    time_spent: 0.into(),
                    exam_prep_time: 0.into(),
                }),
                "Not in department".to_string(),
                None,
            ),
        };

        Self {
            student,
            exam_date: sheet.exam_date_formatted,
            exam_date_raw: sheet.exam_date,
            exam_time: sheet.exam_time,
            exam_state: sheet.state,
            exam_course: sheet.course,
            agency_owner: sheet.agency_owner,
            pass_fail: sheet.pass_fail,
            final_outcome: sheet.final_outcome,
            alert_date: sheet.alert_date,
            study_hours_at_exam: sheet.study_hours_at_exam,
            final_practice: sheet.final_practice,
            chapters_complete: sheet.chapters_complete,
            videos_watched: sheet.videos_watched,
            state_laws_done: sheet.state_laws_done,
            study_consistency: sheet.study_consistency,
            weekly_tracking: sheet.weekly_tracking,
            department_name,
            matched: matched.is_some(),
            has_override,
            readiness,
        }
    }
}

/// Join sheet rows with LMS matches and overrides, upcoming exams first
pub fn build_exam_view(
    sheet: &[ExamRecord],
    matches: &HashMap<String, ExamMatch>,
    overrides: &HashMap<String, exam_override::Model>,
    now: DateTime<Utc>,
) -> Vec<ExamStudentView> {
    let today: NaiveDate = now.date_naive();
    let mut rows: Vec<ExamStudentView> = sheet
        .iter()
        .map(|row| {
            let mut row = row.clone();
            let o = overrides.get(&row.email);
            if let Some(o) = o {
                apply_exam_override(&mut row, o);
            }
            let matched = matches.get(&row.email);
            ExamStudentView::new(row, matched, o.is_some(), now)
        })
        .collect();

    rows.sort_by(|a, b| compare_exam_dates(&a.exam_date_raw, &b.exam_date_raw, today));
    rows
}

/// One point in a student's study history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    pub snapshot_at: DateTime<Utc>,
    pub total_time_min: i64,
    pub prelicense_progress: f64,
    pub exam_prep_progress: f64,
    pub practice_scores: Vec<f64>,
    pub consecutive_passing: i64,
    pub readiness_status: String,
    pub criteria_met: String,
    pub gap_count: i64,
    pub gap_total_days: i64,
    pub largest_gap_days: i64,
    pub life_video_min: i64,
    pub health_video_min: i64,
    pub state_law_min: i64,
    pub state_law_completions: i64,
}

impl From<study_snapshot::Model> for SnapshotView {
    fn from(m: study_snapshot::Model) -> Self {
        Self {
            snapshot_at: m.snapshot_at,
            total_time_min: m.total_time_min,
            prelicense_progress: m.prelicense_progress,
            exam_prep_progress: m.exam_prep_progress,
            practice_scores: m
                .practice_scores
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect(),
            consecutive_passing: m.consecutive_passing,
            readiness_status: m.readiness_status,
            criteria_met: m.criteria_met,
            gap_count: m.gap_count,
            gap_total_days: m.gap_total_days,
            largest_gap_days: m.largest_gap_days,
            life_video_min: m.life_video_min,
            health_video_min: m.health_video_min,
            state_law_min: m.state_law_min,
            state_law_completions: m.state_law_completions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lms::LmsUser;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn sheet_row(name: &str, email: &str, date: &str) -> ExamRecord {
        let mut r = ExamRecord {
            name: name.to_string(),
            email: email.to_string(),
            course: "Life".to_string(),
            ..Default::default()
        };
        r.set_exam_date(date);
        r
    }

    fn matched(email: &str) -> ExamMatch {
        let user = LmsUser {
            id: "u1".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            email: email.to_string(),
            ..Default::default()
        };
        ExamMatch {
            record: Arc::new(StudentRecord::from_enrollments(user, Vec::new())),
            department_name: "North".to_string(),
        }
    }

    fn override_row(email: &str, pass_fail: &str, date: &str) -> exam_override::Model {
        exam_override::Model {
            email: email.to_string(),
            pass_fail: pass_fail.to_string(),
            exam_date: date.to_string(),
            exam_time: String::new(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_exam_view_orders_and_matches() {
        let sheet = vec![
            sheet_row("Past", "past@example.com", "03/01/2025"),
            sheet_row("Ann Lee", "ann@example.com", "03/20/2025"),
            sheet_row("Soon", "soon@example.com", "03/10/2025"),
            sheet_row("Blank", "blank@example.com", ""),
        ];
        let matches = HashMap::from([("ann@example.com".to_string(), matched("ann@example.com"))]);

        let rows = build_exam_view(&sheet, &matches, &HashMap::new(), now());
        let dates: Vec<&str> = rows.iter().map(|r| r.exam_date_raw.as_str()).collect();
        assert_eq!(dates, vec!["03/10/2025", "03/20/2025", "03/01/2025", ""]);

        let ann = rows.iter().find(|r| r.matched).unwrap();
        assert_eq!(ann.department_name, "North");
        assert_eq!(ann.readiness.as_ref().unwrap().criteria_total, 4);

        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["status"]["status"], "UNKNOWN");
        assert_eq!(json["status"]["priority"], 99);
        assert_eq!(json["departmentName"], "Not in department");
        assert_eq!(json["fullName"], "Soon");
        assert!(json["id"].is_null());
    }

    #[test]
    fn test_override_replaces_only_filled_fields() {
        let mut row = sheet_row("Ann", "ann@example.com", "03/20/2025");
        row.exam_time = "9:00 AM".to_string();
        apply_exam_override(&mut row, &override_row("ann@example.com", "Pass", ""));

        assert_eq!(row.pass_fail, "Pass");
        assert_eq!(row.exam_date, "03/20/2025");
        assert_eq!(row.exam_time, "9:00 AM");

        let sheet = vec![row];
        let overrides = HashMap::from([(
            "ann@example.com".to_string(),
            override_row("ann@example.com", "", "04/02/2025"),
        )]);
        let rows = build_exam_view(&sheet, &HashMap::new(), &overrides, now());
        assert!(rows[0].has_override);
        assert_eq!(rows[0].exam_date_raw, "04/02/2025");
        assert_eq!(rows[0].exam_date, "Apr 02, 2025");
    }

    #[test]
    fn test_snapshot_view_parses_scores() {
        let model = study_snapshot::Model {
            id: 1,
            email: "ann@example.com".to_string(),
            snapshot_at: now(),
            total_time_min: 10,
            prelicense_progress: 1.0,
            exam_prep_progress: 2.0,
            practice_scores: "90.0, 70.5".to_string(),
            consecutive_passing: 1,
            readiness_status: "RED".to_string(),
            criteria_met: "1/4".to_string(),
            gap_count: 0,
            gap_total_days: 0,
            largest_gap_days: 0,
            life_video_min: 0,
            health_video_min: 0,
            state_law_min: 0,
            state_law_completions: 0,
        };
        assert_eq!(SnapshotView::from(model).practice_scores, vec![90.0, 70.5]);
    }
}
