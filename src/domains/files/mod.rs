pub mod service;
pub mod types;

pub use service::{
    FileCollectorService, FileProgressFn, HttpRemoteFetcher, RemoteFetcher, RemoteMetadata,
};
pub use types::{CollectedFile, CollectedFiles, FileKind, FileManifest, FileSummary};
