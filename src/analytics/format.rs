//! Display formatting for LMS values
//!
//! The LMS reports durations either as integer minutes or as .NET TimeSpan
//! strings, and timestamps as ISO-8601 with or without an offset. Everything
//! here is pure so handlers and tests can pass an explicit `now`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

/// Parse an LMS timestamp. Values without an offset are taken as UTC.
pub fn parse_lms_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Convert a JSON duration value to whole minutes
pub fn parse_time_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as i64).unwrap_or(0).max(0),
        Value::String(s) => parse_time_spent(s),
        _ => 0,
    }
}

/// Convert `[d.]HH:MM:SS[.fffffff]` or a plain number to whole minutes.
/// Seconds are dropped; anything unparseable is 0.
pub fn parse_time_spent(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }

    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() < 2 {
        return raw.parse::<f64>().map(|f| f as i64).unwrap_or(0).max(0);
    }

    let (days, hours) = match parts[0].split_once('.') {
        Some((d, h)) => match (d.parse::<i64>(), h.parse::<i64>()) {
            (Ok(d), Ok(h)) => (d, h),
            _ => return 0,
        },
        None => match parts[0].parse::<i64>() {
            Ok(h) => (0, h),
            Err(_) => return 0,
        },
    };

    let Ok(minutes) = parts[1].parse::<i64>() else {
        return 0;
    };

    days
        .checked_mul(1440)
        .zip(hours.checked_mul(60))
        .and_then(|(d, h)| d.checked_add(h))
        .and_then(|t| t.checked_add(minutes))
        .map_or(0, |t| t.max(0))
}

/// `0m`, `45m`, `2h`, `2h 30m`
pub fn format_minutes(minutes: i64) -> String {
    if minutes <= 0 {
        return "0m".to_string();
    }
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Progress with display text and a colour bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInfo {
    pub value: f64,
    pub display: String,
    pub color_class: &'static str,
    pub color: &'static str,
}

pub fn format_progress(progress: f64) -> ProgressInfo {
    let progress = if progress.is_finite() {
        progress.clamp(0.0, 100.0)
    } else {
        0.0
    };

    let (color_class, color) = if progress >= 75.0 {
        ("high", "#22c55e")
    } else if progress >= 40.0 {
        ("med", "#f97316")
    } else {
        ("low", "#ef4444")
    };

    ProgressInfo {
        value: round1(progress),
        display: format!("{}%", progress.round() as i64),
        color_class,
        color,
    }
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `Mar 05, 2025 02:30 PM`, or `N/A` when missing
pub fn format_datetime(dt: Option<DateTime<Utc>>) -> String {
    match dt {
        Some(dt) => dt.format("%b %d, %Y %I:%M %p").to_string(),
        None => "N/A".to_string(),
    }
}

/// Relative age of a timestamp; dates older than a week fall back to the date itself
pub fn format_relative(dt: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(dt) = dt else {
        return "Never".to_string();
    };

    let seconds = (now - dt).num_seconds();
    if seconds < 60 {
        "Just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else if seconds < 604_800 {
        format!("{}d ago", seconds / 86_400)
    } else {
        dt.format("%b %d, %Y").to_string()
    }
}

pub fn enrollment_status_text(status: i64) -> &'static str {
    match status {
        0 => "Not Started",
        1 => "In Progress",
        2 | 3 => "Complete",
        4 => "Expired",
        _ => "Unknown",
    }
}
