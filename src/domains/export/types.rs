use futures::stream::Stream;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;

use crate::database::TenantContext;
use crate::errors::DomainResult;

/// One extracted row: friendly column name -> normalized value, in column
/// order. Table shape is only known at runtime, so rows stay dynamic
/// end-to-end.
pub type RowMap = IndexMap<String, Value>;

/// Lazy, forward-only, finite sequence of rows. Not restartable mid-stream;
/// dropping it closes the underlying cursor.
pub type RowStream = Pin<Box<dyn Stream<Item = DomainResult<RowMap>> + Send>>;

/// Per-row transform applied during extraction.
pub type RowProcessorFn = Arc<dyn Fn(RowMap) -> RowMap + Send + Sync>;

/// Invoked as `(table_name, row_count)` after each non-empty table.
pub type ProgressFn = Arc<dyn Fn(&str, usize) + Send + Sync>;

/// Synthetic field carrying the originating table's qualified name.
pub const SOURCE_TABLE_FIELD: &str = "_source_table";
/// Synthetic field carrying the wall-clock extraction timestamp.
pub const EXTRACTED_AT_FIELD: &str = "_extracted_at";

/// How a table's rows are pulled out, chosen purely from its row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    Simple,
    Chunked,
    Streaming,
}

impl ExtractionStrategy {
    pub fn for_row_count(row_count: i64, chunk_size: usize, streaming_threshold: usize) -> Self {
        if row_count > streaming_threshold as i64 {
            ExtractionStrategy::Streaming
        } else if row_count > chunk_size as i64 {
            ExtractionStrategy::Chunked
        } else {
            ExtractionStrategy::Simple
        }
    }
}

/// Result of extracting one table: materialized for simple/chunked
/// strategies, lazy for streaming.
pub enum TableRows {
    Materialized(Vec<RowMap>),
    Streaming(RowStream),
}

impl std::fmt::Debug for TableRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableRows::Materialized(rows) => {
                f.debug_tuple("Materialized").field(rows).finish()
            }
            TableRows::Streaming(_) => f.debug_tuple("Streaming").finish(),
        }
    }
}

impl TableRows {
    /// Drain into a `Vec`, consuming the stream if lazy.
    pub async fn collect(self) -> DomainResult<Vec<RowMap>> {
        use futures::StreamExt;
        match self {
            TableRows::Materialized(rows) => Ok(rows),
            TableRows::Streaming(mut stream) => {
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await {
                    rows.push(row?);
                }
                Ok(rows)
            }
        }
    }
}

/// One extraction invocation, scoped to a single organization.
#[derive(Clone)]
pub struct ExtractionRequest {
    pub tenant: TenantContext,
    /// Restrict to these category keys; unknown keys yield nothing rather
    /// than erroring.
    pub categories: Option<Vec<String>>,
    pub row_processor: Option<RowProcessorFn>,
    pub progress: Option<ProgressFn>,
}

impl ExtractionRequest {
    pub fn new(tenant: TenantContext) -> Self {
        Self {
            tenant,
            categories: None,
            row_processor: None,
            progress: None,
        }
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_row_processor(mut self, processor: RowProcessorFn) -> Self {
        self.row_processor = Some(processor);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// All of one category's extracted data, keyed by friendly table name in
/// dependency order.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryPayload {
    pub label: String,
    pub data: IndexMap<String, Vec<RowMap>>,
    pub table_count: usize,
    pub record_count: usize,
}

/// The top-level extraction result: category key -> payload, in discovery
/// order.
pub type ExtractionResult = IndexMap<String, CategoryPayload>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_thresholds() {
        let chunk = 1000;
        let stream = 10_000;
        assert_eq!(
            ExtractionStrategy::for_row_count(0, chunk, stream),
            ExtractionStrategy::Simple
        );
        assert_eq!(
            ExtractionStrategy::for_row_count(1000, chunk, stream),
            ExtractionStrategy::Simple
        );
        assert_eq!(
            ExtractionStrategy::for_row_count(1001, chunk, stream),
            ExtractionStrategy::Chunked
        );
        assert_eq!(
            ExtractionStrategy::for_row_count(10_000, chunk, stream),
            ExtractionStrategy::Chunked
        );
        assert_eq!(
            ExtractionStrategy::for_row_count(10_001, chunk, stream),
            ExtractionStrategy::Streaming
        );
    }
}
