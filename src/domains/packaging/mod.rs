pub mod checksum;
pub mod service;

pub use checksum::{hash_file, hash_string};
pub use service::{
    ArchivedFile, BackupPackagerService, CategorySummary, ChecksumMismatch, ExtractOutcome,
    FileStats, Manifest, PackageInfo, BACKUP_FORMAT,
};
