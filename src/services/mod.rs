pub mod allowlist;
pub mod exam_sync;
pub mod lms;
pub mod overrides;
pub mod roster;
pub mod scheduler;
pub mod sessions;
pub mod sheets;
pub mod sheets_writer;
pub mod snapshots;

pub use exam_sync::{ExamSyncService, SyncStatus};
pub use lms::{LmsApi, LmsClient};
pub use roster::RosterService;
pub use sheets::{CsvExportSource, SheetService};
pub use sheets_writer::{GoogleSheetsWriter, SheetWriter};
