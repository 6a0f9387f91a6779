use futures::StreamExt;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::domains::discovery::{SchemaDiscovery, TableDescriptor};
use crate::domains::export::memory::MemoryMonitor;
use crate::domains::export::types::{
    ExtractionStrategy, RowMap, RowProcessorFn, RowStream, TableRows,
};
use crate::errors::{DomainError, DomainResult};

/// Rows between memory checks on the streaming path.
const MEMORY_CHECK_INTERVAL: usize = 1000;

/// Per-table extraction with a memory-safe strategy chosen from the table's
/// current row count: small tables in one query, medium tables in keyset
/// pages, large tables through a server-side cursor.
///
/// The strategy is a pure performance decision — all three produce the same
/// rows in the same order for the same table.
pub struct ChunkedExtractor {
    repo: Arc<dyn super::repository::ExtractionRepository>,
    discovery: Arc<dyn SchemaDiscovery>,
    memory: MemoryMonitor,
    chunk_size: usize,
    streaming_threshold: usize,
}

impl ChunkedExtractor {
    pub fn new(
        repo: Arc<dyn super::repository::ExtractionRepository>,
        discovery: Arc<dyn SchemaDiscovery>,
        memory: MemoryMonitor,
    ) -> Self {
        Self {
            repo,
            discovery,
            memory,
            chunk_size: 1000,
            streaming_threshold: 10_000,
        }
    }

    /// Per-call tuning; smaller chunks trade throughput for headroom.
    pub fn set_chunk_size(&mut self, chunk_size: usize) -> &mut Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn set_streaming_threshold(&mut self, streaming_threshold: usize) -> &mut Self {
        self.streaming_threshold = streaming_threshold;
        self
    }

    /// Build a descriptor with a fresh row count. The count drives strategy
    /// selection and can go stale, so it is never cached across calls.
    pub async fn describe(&self, table_name: &str) -> DomainResult<TableDescriptor> {
        Ok(TableDescriptor {
            qualified_name: table_name.to_string(),
            category_key: String::new(),
            category_label: String::new(),
            has_soft_delete: self.discovery.has_soft_deletes(table_name).await?,
            has_timestamp: self.discovery.has_timestamps(table_name).await?,
            row_count: self.discovery.row_count(table_name).await?,
        })
    }

    /// Extract one table with the strategy its row count calls for.
    pub async fn extract(
        &self,
        table_name: &str,
        processor: Option<RowProcessorFn>,
    ) -> DomainResult<TableRows> {
        let table = self.describe(table_name).await?;
        let strategy = ExtractionStrategy::for_row_count(
            table.row_count,
            self.chunk_size,
            self.streaming_threshold,
        );
        log::debug!(
            "extracting {} ({} rows) via {:?}",
            table_name,
            table.row_count,
            strategy
        );
        self.extract_with_strategy(&table, strategy, processor).await
    }

    /// Extract with an explicitly forced strategy. Strategy choice must be
    /// transparent to output, so this exists for callers (and tests) that
    /// need to pin one down.
    pub async fn extract_with_strategy(
        &self,
        table: &TableDescriptor,
        strategy: ExtractionStrategy,
        processor: Option<RowProcessorFn>,
    ) -> DomainResult<TableRows> {
        match strategy {
            ExtractionStrategy::Simple => {
                let rows = self.repo.fetch_all(table).await?;
                Ok(TableRows::Materialized(
                    rows.into_iter().map(|r| apply(&processor, r)).collect(),
                ))
            }
            ExtractionStrategy::Chunked => {
                let rows = self.extract_chunked(table, processor).await?;
                Ok(TableRows::Materialized(rows))
            }
            ExtractionStrategy::Streaming => {
                Ok(TableRows::Streaming(self.stream(table, processor)))
            }
        }
    }

    async fn extract_chunked(
        &self,
        table: &TableDescriptor,
        processor: Option<RowProcessorFn>,
    ) -> DomainResult<Vec<RowMap>> {
        let mut rows = Vec::new();
        let mut cursor: Option<RowMap> = None;

        loop {
            let page = self
                .repo
                .fetch_page(table, cursor.as_ref(), self.chunk_size)
                .await?;
            if page.is_empty() {
                break;
            }
            let exhausted = page.len() < self.chunk_size;
            // Cursor comes from the raw row, before any processing renames
            // the keyset columns.
            cursor = page.last().cloned();
            rows.extend(page.into_iter().map(|r| apply(&processor, r)));

            self.memory.check()?;
            if exhausted {
                break;
            }
        }

        Ok(rows)
    }

    /// Lazy stream with a memory check every `MEMORY_CHECK_INTERVAL` rows.
    /// Restartable from scratch only; an error item ends the sequence.
    fn stream(&self, table: &TableDescriptor, processor: Option<RowProcessorFn>) -> RowStream {
        let monitor = self.memory.clone();
        let raw = self.repo.stream_rows(table);
        Box::pin(raw.enumerate().map(move |(i, item)| {
            let row = item?;
            if (i + 1) % MEMORY_CHECK_INTERVAL == 0 {
                monitor.check()?;
            }
            Ok(apply(&processor, row))
        }))
    }

    /// Stream a table straight into `path` as one JSON array, never holding
    /// more than one row in memory. Returns the number of rows written.
    pub async fn stream_to_file(
        &self,
        table_name: &str,
        path: &Path,
        processor: Option<RowProcessorFn>,
    ) -> DomainResult<u64> {
        let table = self.describe(table_name).await?;
        let file = std::fs::File::create(path)
            .map_err(|e| DomainError::Io(format!("cannot open {} for writing: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"[")?;

        let mut stream = self.stream(&table, processor);
        let mut written: u64 = 0;
        while let Some(row) = stream.next().await {
            let row = row?;
            if written > 0 {
                writer.write_all(b",")?;
            }
            writer.write_all(b"\n")?;
            serde_json::to_writer(&mut writer, &row)?;
            written += 1;
        }

        writer.write_all(b"\n]")?;
        writer.flush()?;
        Ok(written)
    }

    /// Chunked variant that hands each page to `callback` with the running
    /// total before that page, instead of materializing the whole table.
    /// Returns the total rows processed.
    pub async fn extract_batches(
        &self,
        table_name: &str,
        mut callback: impl FnMut(&[RowMap], u64) -> DomainResult<()>,
        batch_size: Option<usize>,
    ) -> DomainResult<u64> {
        let table = self.describe(table_name).await?;
        let batch_size = batch_size.unwrap_or(self.chunk_size);
        let mut total: u64 = 0;
        let mut cursor: Option<RowMap> = None;

        loop {
            let page = self.repo.fetch_page(&table, cursor.as_ref(), batch_size).await?;
            if page.is_empty() {
                break;
            }
            let exhausted = page.len() < batch_size;
            cursor = page.last().cloned();

            callback(&page, total)?;
            total += page.len() as u64;

            self.memory.check()?;
            if exhausted {
                break;
            }
        }

        Ok(total)
    }
}

fn apply(processor: &Option<RowProcessorFn>, row: RowMap) -> RowMap {
    match processor {
        Some(p) => p(row),
        None => row,
    }
}
