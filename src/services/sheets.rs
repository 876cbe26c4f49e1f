//! Exam spreadsheet reader
//!
//! The exam sheet is read through its CSV export. Columns are matched by
//! header name so the sheet owners can reorder or add columns freely.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use validator::ValidationError;

use crate::config::sheets::SheetsConfig;

pub const TRACKING_WEEKS: [&str; 5] = ["T-5", "T-4", "T-3", "T-2", "T-1"];

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("{0}")]
    NotConfigured(String),

    #[error("Failed to fetch exam sheet: {0}")]
    Fetch(String),

    #[error("Exam sheet returned HTTP {0}")]
    Status(u16),

    #[error("Failed to parse exam sheet: {0}")]
    Parse(String),

    #[error("No sheet row for {0}")]
    RowNotFound(String),

    #[error("Google authentication failed: {0}")]
    Auth(String),

    #[error("Failed to write exam sheet: {0}")]
    Write(String),
}

impl From<reqwest::Error> for SheetError {
    fn from(err: reqwest::Error) -> Self {
        SheetError::Fetch(err.to_string())
    }
}

impl From<csv::Error> for SheetError {
    fn from(err: csv::Error) -> Self {
        SheetError::Parse(err.to_string())
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyTracking {
    pub week: String,
    pub status: String,
    pub hours: String,
    pub practice: String,
    pub notes: String,
}

/// One student's row in the exam sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    pub name: String,
    /// Lower-cased
    pub email: String,
    pub phone: String,
    /// As typed in the sheet
    pub exam_date: String,
    pub exam_date_formatted: String,
    pub exam_time: String,
    pub state: String,
    pub course: String,
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
    #[serde(rename = "t0Sent")]
    pub t0_sent: String,
    pub weekly_tracking: Vec<WeeklyTracking>,
}

impl ExamRecord {
    /// Replace the exam date and keep the formatted copy in step
    pub fn set_exam_date(&mut self, raw: &str) {
        self.exam_date = raw.trim().to_string();
        self.exam_date_formatted = format_exam_date(&self.exam_date);
    }
}

const DATE_FORMATS: [&str; 3] = ["%m/%d/%y", "%B %d, %Y", "%b %d, %Y"];

/// Parse the date formats seen in the sheet
pub fn parse_exam_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // `%Y` would accept a two-digit year, so route on the year's width
    let four_digit_year = raw
        .rsplit('/')
        .next()
        .is_some_and(|y| y.len() == 4 && raw.contains('/'));
    if four_digit_year {
        return NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok();
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// `Mar 05, 2025`; `TBD` when blank; unparseable text is shown as is
pub fn format_exam_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "TBD".to_string();
    }
    match parse_exam_date(raw) {
        Some(date) => date.format("%b %d, %Y").to_string(),
        None => raw.to_string(),
    }
}

/// Validator for exam dates entered by admins. Blank clears the date.
pub fn validate_exam_date(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() || parse_exam_date(value).is_some() {
        Ok(())
    } else {
        let mut err = ValidationError::new("exam_date");
        err.message = Some("must be a date like 03/15/2025 or Mar 15, 2025".into());
        Err(err)
    }
}

/// Exam ordering: upcoming dates ascending, then past or unknown dates most recent first
pub fn compare_exam_dates(a: &str, b: &str, today: NaiveDate) -> Ordering {
    let key = |raw: &str| match parse_exam_date(raw) {
        Some(d) if d >= today => (0, Some(d)),
        other => (1, other),
    };
    let (a_group, a_date) = key(a);
    let (b_group, b_date) = key(b);

    a_group.cmp(&b_group).then_with(|| {
        if a_group == 0 {
            a_date.cmp(&b_date)
        } else {
            b_date.cmp(&a_date)
        }
    })
}

/// Parse the CSV export into records keyed by email
pub fn parse_exam_csv(text: &str) -> Result<Vec<ExamRecord>, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim_start_matches('\u{feff}').trim().to_string(), i))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut by_email: HashMap<String, ExamRecord> = HashMap::new();

    for row in reader.records() {
        let row = row?;
        let cell = |name: &str| {
            columns
                .get(name)
                .and_then(|&i| row.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let email = cell("Email").to_lowercase();
        if email.is_empty() {
            continue;
        }

        let weekly_tracking = TRACKING_WEEKS
            .iter()
            .filter_map(|week| {
                let entry = WeeklyTracking {
                    week: week.to_string(),
                    status: cell(&format!("{} Status", week)),
                    hours: cell(&format!("{} Hours", week)),
                    practice: cell(&format!("{} Practice %", week)),
                    notes: cell(&format!("{} Notes", week)),
                };
                let any = !(entry.status.is_empty()
                    && entry.hours.is_empty()
                    && entry.practice.is_empty()
                    && entry.notes.is_empty());
                any.then_some(entry)
            })
            .collect();

        let exam_date = cell("Exam Date");
        let record = ExamRecord {
            name: cell("Student Name"),
            email: email.clone(),
            phone: cell("Phone"),
            exam_date_formatted: format_exam_date(&exam_date),
            exam_date,
            exam_time: cell("Exam Time"),
            state: cell("State"),
            course: cell("Course"),
            agency_owner: cell("Agency Owner"),
            pass_fail: cell("Pass/Fail"),
            final_outcome: cell("Final Outcome"),
            alert_date: cell("Alert Date"),
            study_hours_at_exam: cell("Study Hours at Exam"),
            final_practice: cell("Final Practice %"),
            chapters_complete: cell("Chapters Complete"),
            videos_watched: cell("Videos Watched"),
            state_laws_done: cell("State Laws Done"),
            study_consistency: cell("Study Consistency"),
            t0_sent: cell("T-0 Sent"),
            weekly_tracking,
        };

        // Later rows win; the first appearance fixes the position
        if by_email.insert(email.clone(), record).is_none() {
            order.push(email);
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|email| by_email.remove(&email))
        .collect())
}

// ============================================================================
// Sources
// ============================================================================

/// Where the raw CSV comes from
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch_csv(&self) -> Result<String, SheetError>;
}

/// Published CSV export over HTTP
pub struct CsvExportSource {
    http: reqwest::Client,
    url: Option<String>,
}

impl CsvExportSource {
    pub fn new(config: &SheetsConfig) -> Result<Self, SheetError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let url = config.csv_url.clone().or_else(|| {
            config.spreadsheet_id.as_ref().map(|id| {
                format!("https://docs.google.com/spreadsheets/d/{}/export?format=csv", id)
            })
        });
        Ok(Self { http, url })
    }
}

#[async_trait]
impl SheetSource for CsvExportSource {
    async fn fetch_csv(&self) -> Result<String, SheetError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| SheetError::NotConfigured("Exam sheet is not configured".to_string()))?;

        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(SheetError::Status(resp.status().as_u16()));
        }
        Ok(resp.text().await?)
    }
}

// ============================================================================
// Cached service
// ============================================================================

struct CachedSheet {
    records: Arc<Vec<ExamRecord>>,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct SheetService {
    source: Arc<dyn SheetSource>,
    cache: Arc<RwLock<Option<CachedSheet>>>,
    ttl: Duration,
}

impl SheetService {
    pub fn new(source: Arc<dyn SheetSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    /// Sheet records, cached. A failed fetch falls back to stale data when there is any.
    pub async fn records(&self) -> Result<Arc<Vec<ExamRecord>>, SheetError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.records.clone());
            }
        }

        match self.fetch().await {
            Ok(records) => {
                let records = Arc::new(records);
                *self.cache.write().await = Some(CachedSheet {
                    records: records.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(records)
            }
            Err(e) => {
                if let Some(cached) = self.cache.read().await.as_ref() {
                    tracing::warn!(error = %e, "Exam sheet fetch failed, serving stale data");
                    return Ok(cached.records.clone());
                }
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<ExamRecord>, SheetError> {
        let text = self.source.fetch_csv().await?;
        let records = parse_exam_csv(&text)?;
        tracing::info!(count = records.len(), "Parsed exam sheet");
        Ok(records)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        tracing::debug!("Exam sheet cache invalidated");
    }

    /// Drop the cache and read the sheet again
    pub async fn refresh(&self) -> Result<Arc<Vec<ExamRecord>>, SheetError> {
        self.invalidate().await;
        self.records().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    const CSV: &str = "\u{feff}Student Name,Email,Phone,Exam Date,Exam Time,State,Course,Agency Owner,Pass/Fail,Final Outcome,T-2 Status,T-2 Hours,T-1 Notes\n\
Ann Lee,ANN@example.com,555,3/15/2025,9:00 AM,OH,Life & Health,Bo,,,On track,5,\n\
No Email,,555,,,,,,,,,,\n\
Ray Ng,ray@example.com,,\"March 2, 2025\",,TX,Life,Bo,Pass,Licensed,,,\n\
Ann Lee,ann@example.com,777,4/01/25,10:00 AM,OH,Life & Health,Bo,,,,,call back\n";

    #[test]
    fn test_parse_dedups_keeping_first_position_and_last_values() {
        let records = parse_exam_csv(CSV).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].email, "ann@example.com");
        assert_eq!(records[0].phone, "777");
        assert_eq!(records[0].exam_date_formatted, "Apr 01, 2025");
        assert_eq!(records[1].name, "Ray Ng");
        assert_eq!(records[1].pass_fail, "Pass");
    }

    #[test]
    fn test_weekly_tracking_only_includes_filled_weeks() {
        let records = parse_exam_csv(CSV).unwrap();

        assert_eq!(records[0].weekly_tracking.len(), 1);
        assert_eq!(records[0].weekly_tracking[0].week, "T-1");
        assert_eq!(records[0].weekly_tracking[0].notes, "call back");
        assert!(records[1].weekly_tracking.is_empty());
    }

    #[test]
    fn test_missing_columns_are_blank() {
        let records = parse_exam_csv("Email,Student Name\nx@example.com,X\n").unwrap();
        assert_eq!(records[0].state, "");
        assert_eq!(records[0].exam_date_formatted, "TBD");
    }

    #[test]
    fn test_exam_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 5);
        assert_eq!(parse_exam_date("3/5/2025"), expected);
        assert_eq!(parse_exam_date("03/05/25"), expected);
        assert_eq!(parse_exam_date("March 5, 2025"), expected);
        assert_eq!(parse_exam_date("Mar 05, 2025"), expected);
        assert_eq!(parse_exam_date("next week"), None);

        assert_eq!(format_exam_date(""), "TBD");
        assert_eq!(format_exam_date("pending"), "pending");
        assert_eq!(format_exam_date("3/5/2025"), "Mar 05, 2025");
    }

    #[test]
    fn test_validate_exam_date() {
        assert!(validate_exam_date("").is_ok());
        assert!(validate_exam_date("12/01/2025").is_ok());
        assert!(validate_exam_date("soon").is_err());
    }

    #[test]
    fn test_exam_ordering() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut dates = vec!["5/1/2025", "", "7/1/2025", "6/1/2025", "4/1/2025", "6/15/2025"];
        dates.sort_by(|a, b| compare_exam_dates(a, b, today));

        assert_eq!(
            dates,
            vec!["6/1/2025", "6/15/2025", "7/1/2025", "5/1/2025", "4/1/2025", ""]
        );
    }

    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SheetSource for FlakySource {
        async fn fetch_csv(&self) -> Result<String, SheetError> {
            if self.calls.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
                Ok("Email\na@example.com\n".to_string())
            } else {
                Err(SheetError::Status(500))
            }
        }
    }

    #[tokio::test]
    async fn test_cache_and_stale_fallback() {
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        let service = SheetService::new(source.clone(), Duration::from_secs(300));

        assert_eq!(service.records().await.unwrap().len(), 1);
        assert_eq!(service.records().await.unwrap().len(), 1);
        assert_eq!(source.calls.load(AtomicOrdering::SeqCst), 1);

        // Expire the cache; the failed refetch serves the stale copy
        let stale = SheetService {
            ttl: Duration::ZERO,
            ..service.clone()
        };
        assert_eq!(stale.records().await.unwrap().len(), 1);
        assert_eq!(source.calls.load(AtomicOrdering::SeqCst), 2);

        service.invalidate().await;
        assert!(matches!(service.records().await, Err(SheetError::Status(500))));
    }
}
