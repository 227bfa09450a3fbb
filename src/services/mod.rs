pub mod file_service;
pub mod version_service;

pub use file_service::FileService;
pub use version_service::{FileGuard, FileLocks, RevertOutcome, VersionStore};
