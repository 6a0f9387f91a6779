use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::BackupConfig;
use crate::database::{with_tenant_context, TenantContextInitializer};
use crate::domains::discovery::{SchemaDiscovery, TableDescriptor};
use crate::domains::export::mapper::ExportMapper;
use crate::domains::export::memory::MemoryMonitor;
use crate::domains::export::repository::ExtractionRepository;
use crate::domains::export::types::{
    CategoryPayload, ExtractionRequest, ExtractionResult, RowMap, RowStream, EXTRACTED_AT_FIELD,
    SOURCE_TABLE_FIELD,
};
use crate::errors::{DomainError, DomainResult};

/// Rough per-record sizing constant for pre-flight capacity planning.
const AVERAGE_RECORD_BYTES: u64 = 1024;

/// Whole-organization extraction: every org-scoped table, grouped by
/// category, ordered so referenced tables come before referencing tables,
/// with rows normalized for export.
///
/// Failure policy is best-effort at table granularity — one broken table is
/// logged and skipped so a backup of hundreds of tables survives it — with a
/// circuit breaker that aborts the run once failures stop looking isolated.
pub struct DataExtractorService {
    discovery: Arc<dyn SchemaDiscovery>,
    repo: Arc<dyn ExtractionRepository>,
    mapper: Arc<dyn ExportMapper>,
    tenant_init: Arc<dyn TenantContextInitializer>,
    memory: MemoryMonitor,
    chunk_size: usize,
    large_table_memory_limit_mb: u64,
    max_table_failures: usize,
}

impl DataExtractorService {
    pub fn new(
        discovery: Arc<dyn SchemaDiscovery>,
        repo: Arc<dyn ExtractionRepository>,
        mapper: Arc<dyn ExportMapper>,
        tenant_init: Arc<dyn TenantContextInitializer>,
        memory: MemoryMonitor,
        config: &BackupConfig,
    ) -> Self {
        Self {
            discovery,
            repo,
            mapper,
            tenant_init,
            memory,
            chunk_size: config.chunk_size,
            large_table_memory_limit_mb: config.large_table_memory_limit_mb,
            max_table_failures: config.max_table_failures,
        }
    }

    /// Extract everything the organization owns, category by category.
    ///
    /// The tenant context is set before the first query and reset on every
    /// exit path. A category filter restricts output to the named keys;
    /// unknown keys yield nothing rather than failing the run.
    pub async fn extract_all_data(
        &self,
        request: &ExtractionRequest,
    ) -> DomainResult<ExtractionResult> {
        with_tenant_context(self.tenant_init.as_ref(), &request.tenant, || async {
            self.extract_all_inner(request).await
        })
        .await
    }

    async fn extract_all_inner(
        &self,
        request: &ExtractionRequest,
    ) -> DomainResult<ExtractionResult> {
        let mut categories = self.discovery.discover_by_category().await?;
        if let Some(filter) = &request.categories {
            categories.retain(|(key, _)| filter.contains(key));
        }

        let mut result = ExtractionResult::new();
        let mut failed_tables = 0usize;

        for (key, category) in categories {
            let ordered = self
                .discovery
                .resolve_extraction_order(&category.tables)
                .await?;

            let mut data: IndexMap<String, Vec<RowMap>> = IndexMap::new();
            let mut record_count = 0usize;

            for table in &ordered {
                let mut rows = match self.try_extract_table(table).await {
                    Ok(rows) => rows,
                    Err(err) => {
                        failed_tables += 1;
                        log::error!("extraction failed for {}: {}", table, err);
                        if failed_tables > self.max_table_failures {
                            return Err(DomainError::TooManyFailures {
                                failed: failed_tables,
                                limit: self.max_table_failures,
                            });
                        }
                        continue;
                    }
                };
                if rows.is_empty() {
                    continue;
                }
                if let Some(processor) = &request.row_processor {
                    rows = rows.into_iter().map(|row| processor(row)).collect();
                }

                record_count += rows.len();
                if let Some(progress) = &request.progress {
                    progress(table, rows.len());
                }
                data.insert(self.mapper.table_friendly_name(table), rows);
            }

            if data.is_empty() {
                continue;
            }
            let table_count = data.len();
            result.insert(
                key,
                CategoryPayload {
                    label: category.label,
                    data,
                    table_count,
                    record_count,
                },
            );
        }

        Ok(result)
    }

    /// Extract one table, absorbing any failure into an empty result.
    pub async fn extract_table_data(&self, table_name: &str) -> Vec<RowMap> {
        match self.try_extract_table(table_name).await {
            Ok(rows) => rows,
            Err(err) => {
                log::error!("extraction failed for {}: {}", table_name, err);
                Vec::new()
            }
        }
    }

    async fn try_extract_table(&self, table_name: &str) -> DomainResult<Vec<RowMap>> {
        let table = self.describe(table_name).await?;
        if table.row_count == 0 {
            return Ok(Vec::new());
        }

        if table.row_count > self.chunk_size as i64 {
            return self.extract_large_table(&table).await;
        }

        let extracted_at = now_iso();
        let rows = self.repo.fetch_all(&table).await?;
        Ok(rows
            .into_iter()
            .map(|raw| process_row(self.mapper.as_ref(), table_name, raw, &extracted_at))
            .collect())
    }

    /// Cursor-based extraction for tables too big for one query, with a
    /// blunt absolute memory ceiling checked every `chunk_size` rows. This
    /// path is the rare fallback inside a per-table loop, so pressure here
    /// aborts immediately with no grace step.
    async fn extract_large_table(&self, table: &TableDescriptor) -> DomainResult<Vec<RowMap>> {
        let extracted_at = now_iso();
        let mut stream = self.repo.stream_rows(table);
        let mut rows = Vec::new();

        while let Some(raw) = stream.next().await {
            rows.push(process_row(
                self.mapper.as_ref(),
                &table.qualified_name,
                raw?,
                &extracted_at,
            ));
            if rows.len() % self.chunk_size == 0 {
                self.memory
                    .check_absolute(self.large_table_memory_limit_mb)?;
            }
        }

        Ok(rows)
    }

    /// Lazy variant of the large-table path for callers piping rows to a
    /// sink. Forward-only, finite, not restartable mid-stream.
    pub async fn extract_table_data_stream(&self, table_name: &str) -> DomainResult<RowStream> {
        let table = self.describe(table_name).await?;
        let mapper = self.mapper.clone();
        let name = table.qualified_name.clone();
        let extracted_at = now_iso();
        let raw = self.repo.stream_rows(&table);
        Ok(Box::pin(raw.map(move |item| {
            item.map(|row| process_row(mapper.as_ref(), &name, row, &extracted_at))
        })))
    }

    async fn describe(&self, table_name: &str) -> DomainResult<TableDescriptor> {
        Ok(TableDescriptor {
            qualified_name: table_name.to_string(),
            category_key: String::new(),
            category_label: String::new(),
            has_soft_delete: self.discovery.has_soft_deletes(table_name).await?,
            has_timestamp: self.discovery.has_timestamps(table_name).await?,
            row_count: self.discovery.row_count(table_name).await?,
        })
    }

    /// Serialize any extracted payload. `serde_json` leaves Unicode and
    /// forward slashes unescaped, so exported non-Latin content and URLs
    /// stay readable.
    pub fn to_json<T: Serialize>(&self, data: &T, pretty: bool) -> DomainResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Pre-flight size estimate: total row count times a fixed average
    /// record size. A planning figure, nothing more.
    pub async fn estimate_backup_size(&self, request: &ExtractionRequest) -> DomainResult<u64> {
        with_tenant_context(self.tenant_init.as_ref(), &request.tenant, || async {
            let categories = self.discovery.discover_by_category().await?;
            let mut total_rows: u64 = 0;
            for (_, category) in &categories {
                for table in &category.tables {
                    total_rows += self.discovery.row_count(table).await?.max(0) as u64;
                }
            }
            Ok(total_rows * AVERAGE_RECORD_BYTES)
        })
        .await
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Normalize one raw row for export: friendly column names, decoded JSON
/// strings, ISO timestamps, plus provenance fields.
pub fn process_row(
    mapper: &dyn ExportMapper,
    table: &str,
    raw: RowMap,
    extracted_at: &str,
) -> RowMap {
    let mut processed = RowMap::with_capacity(raw.len() + 2);
    for (column, value) in raw {
        let friendly = mapper.column_friendly_name(table, &column);
        processed.insert(friendly, normalize_value(value));
    }
    processed.insert(SOURCE_TABLE_FIELD.into(), Value::String(table.to_string()));
    processed.insert(
        EXTRACTED_AT_FIELD.into(),
        Value::String(extracted_at.to_string()),
    );
    processed
}

/// Decode JSON stored as text and normalize datetime strings; everything
/// else passes through unchanged.
pub fn normalize_value(value: Value) -> Value {
    let Value::String(s) = value else {
        return value;
    };

    let trimmed = s.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(decoded) = serde_json::from_str::<Value>(&s) {
            return decoded;
        }
        return Value::String(s);
    }

    if let Some(iso) = normalize_datetime(&s) {
        return Value::String(iso);
    }

    Value::String(s)
}

/// Reformat space-separated database timestamps (`2026-01-02 03:04:05+00`)
/// as ISO 8601. Strings that don't look like timestamps return `None`.
fn normalize_datetime(s: &str) -> Option<String> {
    // Cheap shape check before paying for a parse
    if s.len() < 19 || s.as_bytes().get(10) != Some(&b' ') {
        return None;
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = chrono::DateTime::parse_from_str(s, fmt) {
            return Some(dt.to_rfc3339());
        }
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(format!("{}", naive.format("%Y-%m-%dT%H:%M:%S%.f")));
    }
    None
}
