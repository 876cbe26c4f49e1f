//! Study gap metrics
//!
//! Every date on every enrollment counts as a study day. A gap is any pair of
//! consecutive study days more than one calendar day apart.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::services::lms::Enrollment;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapMetrics {
    pub study_gap_count: i64,
    pub total_gap_days: i64,
    pub largest_gap_days: i64,
    /// Start of the most recent gap
    pub last_gap_date: Option<NaiveDate>,
    pub study_dates_count: i64,
}

fn calendar_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim().get(..10)?, "%Y-%m-%d").ok()
}

pub fn study_dates(enrollments: &[Enrollment]) -> BTreeSet<NaiveDate> {
    enrollments
        .iter()
        .flat_map(|e| {
            [
                &e.date_started,
                &e.date_edited,
                &e.access_date,
                &e.date_completed,
                &e.date_added,
            ]
        })
        .filter_map(|d| d.as_deref().and_then(calendar_day))
        .collect()
}

pub fn calculate_gap_metrics(enrollments: &[Enrollment]) -> GapMetrics {
    let dates: Vec<NaiveDate> = study_dates(enrollments).into_iter().collect();

    let mut metrics = GapMetrics {
        study_dates_count: dates.len() as i64,
        ..Default::default()
    };

    for pair in dates.windows(2) {
        let days = (pair[1] - pair[0]).num_days();
        if days > 1 {
            metrics.study_gap_count += 1;
            metrics.total_gap_days += days;
            metrics.largest_gap_days = metrics.largest_gap_days.max(days);
            metrics.last_gap_date = Some(pair[0]);
        }
    }

    metrics
}
