pub mod discovery;
pub mod export;
pub mod files;
pub mod packaging;

pub use export::{ChunkedExtractor, DataExtractorService};
pub use files::FileCollectorService;
pub use packaging::BackupPackagerService;
