use std::path::PathBuf;

use super::{env_opt, env_parse};

/// Exam spreadsheet settings
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Public CSV export URL of the exam sheet (env: `EXAM_SHEET_CSV_URL`)
    pub csv_url: Option<String>,
    /// Spreadsheet id used for write-back (env: `EXAM_SHEET_ID`)
    pub spreadsheet_id: Option<String>,
    /// Worksheet tab name (env: `EXAM_SHEET_TAB`)
    pub worksheet: String,
    /// Service account JSON, inline (env: `GOOGLE_SHEETS_CREDENTIALS_JSON`)
    pub credentials_json: Option<String>,
    /// Service account JSON file (env: `GOOGLE_SHEETS_CREDENTIALS_FILE`)
    pub credentials_file: Option<PathBuf>,
    pub cache_ttl_secs: u64,
}

impl SheetsConfig {
    pub fn from_env() -> Self {
        Self {
            csv_url: env_opt("EXAM_SHEET_CSV_URL"),
            spreadsheet_id: env_opt("EXAM_SHEET_ID"),
            worksheet: env_opt("EXAM_SHEET_TAB").unwrap_or_else(|| "Sheet1".to_string()),
            credentials_json: env_opt("GOOGLE_SHEETS_CREDENTIALS_JSON"),
            credentials_file: env_opt("GOOGLE_SHEETS_CREDENTIALS_FILE").map(PathBuf::from),
            cache_ttl_secs: env_parse("CACHE_TTL_SECS", 300),
        }
    }

    /// Load the service account JSON from the inline variable or the file
    pub fn load_credentials(&self) -> Option<String> {
        if let Some(json) = &self.credentials_json {
            return Some(json.clone());
        }
        self.credentials_file
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok())
    }
}
