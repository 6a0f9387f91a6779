//! Organization data-extraction and backup core for the CMIS platform.
//!
//! Streams an entire tenant's relational data and referenced files out of a
//! multi-tenant Postgres database under row-level-security context, chooses
//! a per-table extraction strategy (simple, chunked, or streaming) from live
//! row counts, guards against memory pressure, and packages the result into
//! a checksummed ZIP archive.
//!
//! Typical flow: [`DataExtractorService::extract_all_data`] produces a
//! category-keyed payload, [`FileCollectorService::collect_files`] gathers
//! the binary assets those rows reference, and [`BackupPackagerService`]
//! packs both into an archive.
//!
//! [`DataExtractorService::extract_all_data`]: domains::export::DataExtractorService::extract_all_data
//! [`FileCollectorService::collect_files`]: domains::files::FileCollectorService::collect_files
//! [`BackupPackagerService`]: domains::packaging::BackupPackagerService

pub mod config;
pub mod database;
pub mod domains;
pub mod errors;

pub use config::BackupConfig;
pub use database::{TenantContext, TenantContextInitializer};
pub use domains::{BackupPackagerService, ChunkedExtractor, DataExtractorService, FileCollectorService};
pub use errors::{DbError, DomainError, ServiceError};
