pub mod chunked_extractor;
pub mod mapper;
pub mod memory;
pub mod repository;
pub mod service;
pub mod types;

pub use chunked_extractor::ChunkedExtractor;
pub use mapper::{DefaultExportMapper, ExportMapper};
pub use memory::{MemoryMonitor, MemoryProbe, ProcMemoryProbe};
pub use repository::{ExtractionRepository, PgExtractionRepository};
pub use service::DataExtractorService;
pub use types::{
    CategoryPayload, ExtractionRequest, ExtractionResult, ExtractionStrategy, RowMap, RowStream,
    TableRows, EXTRACTED_AT_FIELD, SOURCE_TABLE_FIELD,
};
