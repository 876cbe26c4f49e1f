use std::sync::Arc;
use std::time::Duration;

use crate::config::auth::AuthConfig;
use crate::config::Config;
use crate::db::DbConn;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::exam_sync::ExamSyncService;
use crate::services::lms::LmsApi;
use crate::services::roster::RosterService;
use crate::services::sheets::{SheetService, SheetSource};
use crate::services::sheets_writer::SheetWriter;

/// External integrations the state is built from. Tests pass fakes here.
pub struct Integrations {
    pub lms: Arc<dyn LmsApi>,
    pub sheet_source: Arc<dyn SheetSource>,
    pub sheet_writer: Arc<dyn SheetWriter>,
}

/// Application state containing all shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub lms: Arc<dyn LmsApi>,
    pub roster: RosterService,
    pub sheets: SheetService,
    pub sheet_writer: Arc<dyn SheetWriter>,
    pub exam_sync: ExamSyncService,
    pub login_limiter: RateLimiter,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(db: DbConn, integrations: Integrations, config: &Config) -> Self {
        let Integrations {
            lms,
            sheet_source,
            sheet_writer,
        } = integrations;

        let sheets = SheetService::new(
            sheet_source,
            Duration::from_secs(config.sheets.cache_ttl_secs),
        );
        let roster = RosterService::new(lms.clone(), db.clone(), &config.lms);
        let exam_sync = ExamSyncService::new(
            lms.clone(),
            sheets.clone(),
            db.clone(),
            config.sync.clone(),
            config.lms.concurrency,
        );

        Self {
            db,
            lms,
            roster,
            sheets,
            sheet_writer,
            exam_sync,
            login_limiter: RateLimiter::per_minute(config.auth.login_rate_limit_per_minute),
            auth: Arc::new(config.auth.clone()),
        }
    }
}
