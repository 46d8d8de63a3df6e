pub mod archive;
pub mod config;
pub mod constants;
pub mod db;
pub mod dump;
pub mod error;
pub mod integrity;
pub mod orchestrator;
pub mod record;
pub mod scratch;

pub use config::AppConfig;
pub use db::BackupRepository;
pub use error::{BackupError, Result};
pub use orchestrator::BackupOrchestrator;
pub use record::{BackupKind, BackupOptions, BackupRecord, BackupStatus};
