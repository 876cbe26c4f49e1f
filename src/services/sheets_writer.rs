//! Exam spreadsheet write-back
//!
//! Uses the Google Sheets v4 REST API with a service account. The account's
//! key signs a short-lived RS256 assertion which is exchanged for an OAuth
//! access token; the token is reused until shortly before it expires.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::sheets::SheetError;
use crate::config::sheets::SheetsConfig;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Sheet columns an admin may edit, by header name
pub const EXAM_DATE_COLUMN: &str = "Exam Date";
pub const EXAM_TIME_COLUMN: &str = "Exam Time";
pub const PASS_FAIL_COLUMN: &str = "Pass/Fail";
pub const NAME_COLUMN: &str = "Student Name";
pub const PHONE_COLUMN: &str = "Phone";
pub const EMAIL_COLUMN: &str = "Email";

#[async_trait]
pub trait SheetWriter: Send + Sync {
    fn is_configured(&self) -> bool;

    /// Write `(header, value)` pairs into the row whose Email matches.
    /// Returns the number of cells written.
    async fn update_exam_row(&self, email: &str, fields: &[(&str, String)]) -> Result<usize, SheetError>;
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ValueRange {
    pub range: String,
    pub values: Vec<Vec<String>>,
}

/// Zero-based column index to A1 letters: 0 → A, 25 → Z, 26 → AA
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn header_index(header: &[String], name: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// One-based sheet row holding `email`, skipping the header row
pub fn locate_row(rows: &[Vec<String>], email: &str) -> Option<usize> {
    let header = rows.first()?;
    let col = header_index(header, EMAIL_COLUMN)?;
    let email = email.trim().to_lowercase();
    rows.iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| {
            row.get(col)
                .is_some_and(|v| v.trim().to_lowercase() == email)
        })
        .map(|(i, _)| i + 1)
}

/// Cell updates for the given row. Unknown headers are skipped.
pub fn build_updates(
    worksheet: &str,
    header: &[String],
    row: usize,
    fields: &[(&str, String)],
) -> Vec<ValueRange> {
    fields
        .iter()
        .filter_map(|(name, value)| match header_index(header, name) {
            Some(col) => Some(ValueRange {
                range: format!("'{}'!{}{}", worksheet, column_letter(col), row),
                values: vec![vec![value.clone()]],
            }),
            None => {
                tracing::warn!(column = %name, "Sheet column not found, skipping");
                None
            }
        })
        .collect()
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub struct GoogleSheetsWriter {
    http: reqwest::Client,
    spreadsheet_id: Option<String>,
    worksheet: String,
    account: Option<ServiceAccount>,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheetsWriter {
    pub fn new(config: &SheetsConfig) -> Result<Self, SheetError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let account = match config.load_credentials() {
            Some(json) => match serde_json::from_str::<ServiceAccount>(&json) {
                Ok(account) => Some(account),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring invalid Google service account credentials");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            http,
            spreadsheet_id: config.spreadsheet_id.clone(),
            worksheet: config.worksheet.clone(),
            account,
            token: Mutex::new(None),
        })
    }

    fn parts(&self) -> Result<(&str, &ServiceAccount), SheetError> {
        match (self.spreadsheet_id.as_deref(), self.account.as_ref()) {
            (Some(id), Some(account)) => Ok((id, account)),
            _ => Err(SheetError::NotConfigured(
                "Sheet write-back is not configured. Set EXAM_SHEET_ID and GOOGLE_SHEETS_CREDENTIALS_JSON."
                    .to_string(),
            )),
        }
    }

    async fn access_token(&self, account: &ServiceAccount) -> Result<String, SheetError> {
        let now = Utc::now().timestamp();
        {
            let cached = self.token.lock();
            if let Some(token) = cached.as_ref().filter(|t| t.expires_at - 60 > now) {
                return Ok(token.value.clone());
            }
        }

        let token_uri = account.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let claims = AssertionClaims {
            iss: &account.client_email,
            scope: SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| SheetError::Auth(format!("Invalid private key: {}", e)))?;
        let assertion = encode(&Header::new(jsonwebtoken::Algorithm::RS256), &claims, &key)
            .map_err(|e| SheetError::Auth(e.to_string()))?;

        let resp = self
            .http
            .post(token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SheetError::Auth(format!("token endpoint returned {}", resp.status())));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SheetError::Auth(e.to_string()))?;

        *self.token.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        tracing::debug!(account = %account.client_email, "Obtained Google access token");
        Ok(token.access_token)
    }

    async fn read_rows(&self, id: &str, token: &str) -> Result<Vec<Vec<String>>, SheetError> {
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_API,
            id,
            urlencoding::encode(&format!("'{}'", self.worksheet))
        );
        let resp = self.http.get(&url).bearer_auth(token).send().await?;
        if !resp.status().is_success() {
            return Err(SheetError::Status(resp.status().as_u16()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SheetError::Parse(e.to_string()))?;

        Ok(body
            .get("values")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(cell_text).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl SheetWriter for GoogleSheetsWriter {
    fn is_configured(&self) -> bool {
        self.parts().is_ok()
    }

    async fn update_exam_row(&self, email: &str, fields: &[(&str, String)]) -> Result<usize, SheetError> {
        let (id, account) = self.parts()?;
        if fields.is_empty() {
            return Ok(0);
        }

        let token = self.access_token(account).await?;
        let rows = self.read_rows(id, &token).await?;
        let row = locate_row(&rows, email)
            .ok_or_else(|| SheetError::RowNotFound(email.to_string()))?;
        let header = rows.first().cloned().unwrap_or_default();

        let data = build_updates(&self.worksheet, &header, row, fields);
        if data.is_empty() {
            return Ok(0);
        }

        let resp = self
            .http
            .post(format!("{}/{}/values:batchUpdate", SHEETS_API, id))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "valueInputOption": "USER_ENTERED",
                "data": data,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetError::Write(format!(
                "{}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        tracing::info!(email, row, cells = data.len(), "Updated exam sheet row");
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(51), "AZ");
        assert_eq!(column_letter(52), "BA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_locate_row() {
        let rows = vec![
            strings(&["Student Name", " email "]),
            strings(&["A", "a@example.com"]),
            strings(&["B"]),
            strings(&["C", "C@Example.com"]),
        ];
        assert_eq!(locate_row(&rows, "c@example.com"), Some(4));
        assert_eq!(locate_row(&rows, "zzz@example.com"), None);
        assert_eq!(locate_row(&[], "a@example.com"), None);
    }

    #[test]
    fn test_build_updates_maps_headers() {
        let header = strings(&["Student Name", "Email", "Exam Date", "Pass/Fail"]);
        let updates = build_updates(
            "Sheet1",
            &header,
            7,
            &[
                (EXAM_DATE_COLUMN, "03/15/2025".to_string()),
                (PASS_FAIL_COLUMN, "Pass".to_string()),
                (EXAM_TIME_COLUMN, "9:00".to_string()),
            ],
        );

        assert_eq!(
            updates,
            vec![
                ValueRange {
                    range: "'Sheet1'!C7".to_string(),
                    values: vec![vec!["03/15/2025".to_string()]],
                },
                ValueRange {
                    range: "'Sheet1'!D7".to_string(),
                    values: vec![vec!["Pass".to_string()]],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unconfigured_writer() {
        let config = SheetsConfig {
            csv_url: None,
            spreadsheet_id: None,
            worksheet: "Sheet1".to_string(),
            credentials_json: None,
            credentials_file: None,
            cache_ttl_secs: 300,
        };
        let writer = GoogleSheetsWriter::new(&config).unwrap();

        assert!(!writer.is_configured());
        let err = writer
            .update_exam_row("a@example.com", &[(PASS_FAIL_COLUMN, "Pass".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, SheetError::NotConfigured(_)));
    }
}
