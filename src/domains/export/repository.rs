use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::domains::discovery::TableDescriptor;
use crate::domains::export::types::{RowMap, RowStream};
use crate::errors::{DbError, DomainError, DomainResult};

/// Row access for the extraction strategies. All three strategies share the
/// same query shape (soft-delete filter, stable ordering), so their outputs
/// differ only in how rows are fetched, never in which rows come back.
#[async_trait]
pub trait ExtractionRepository: Send + Sync {
    /// Fetch every matching row in one query (simple strategy).
    async fn fetch_all(&self, table: &TableDescriptor) -> DomainResult<Vec<RowMap>>;

    /// Fetch one keyset page after the given row (chunked strategy). `after`
    /// is the last raw row of the previous page, or `None` for the first.
    async fn fetch_page(
        &self,
        table: &TableDescriptor,
        after: Option<&RowMap>,
        limit: usize,
    ) -> DomainResult<Vec<RowMap>>;

    /// Open a server-side cursor over the table (streaming strategy).
    fn stream_rows(&self, table: &TableDescriptor) -> RowStream;
}

/// Postgres implementation. Rows come back as `row_to_json(t.*)` so the
/// dynamic table shape never needs compile-time knowledge.
///
/// Tenant scoping is session state: the pool this repository holds must be
/// the same (single-connection) pool the tenant context was initialized on.
pub struct PgExtractionRepository {
    pool: PgPool,
}

impl PgExtractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Shared ordering for every strategy: creation order when the table records
/// it, primary key otherwise. Keyset pagination paginates on the same tuple,
/// which keeps chunked output identical to simple/streaming output.
pub fn order_clause(table: &TableDescriptor) -> &'static str {
    if table.has_timestamp {
        "ORDER BY t.created_at, t.id"
    } else {
        "ORDER BY t.id"
    }
}

fn soft_delete_clause(table: &TableDescriptor) -> &'static str {
    if table.has_soft_delete {
        "t.deleted_at IS NULL"
    } else {
        "TRUE"
    }
}

/// Full-table select used by the simple and streaming strategies.
pub fn build_select(table: &TableDescriptor) -> String {
    format!(
        "SELECT row_to_json(t.*) AS row FROM {} t WHERE {} {}",
        table.qualified_name,
        soft_delete_clause(table),
        order_clause(table)
    )
}

/// Keyset page select. Primary keys are UUIDs platform-wide, so cursor
/// values bind as text and cast server-side.
pub fn build_page_select(table: &TableDescriptor, has_cursor: bool) -> String {
    let cursor_clause = match (has_cursor, table.has_timestamp) {
        (false, _) => "TRUE".to_string(),
        (true, true) => "(t.created_at, t.id) > ($1::timestamptz, $2::uuid)".to_string(),
        (true, false) => "t.id > $1::uuid".to_string(),
    };
    let limit_param = match (has_cursor, table.has_timestamp) {
        (false, _) => "$1",
        (true, true) => "$3",
        (true, false) => "$2",
    };
    format!(
        "SELECT row_to_json(t.*) AS row FROM {} t WHERE {} AND {} {} LIMIT {}",
        table.qualified_name,
        soft_delete_clause(table),
        cursor_clause,
        order_clause(table),
        limit_param
    )
}

/// Pull the keyset cursor values out of the last raw row of a page.
fn cursor_values(table: &TableDescriptor, row: &RowMap) -> DomainResult<Vec<String>> {
    let mut values = Vec::new();
    if table.has_timestamp {
        values.push(cursor_field(row, "created_at")?);
    }
    values.push(cursor_field(row, "id")?);
    Ok(values)
}

fn cursor_field(row: &RowMap, field: &str) -> DomainResult<String> {
    match row.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(DomainError::Schema(format!(
            "row missing keyset column '{}'",
            field
        ))),
    }
}

fn row_to_map(value: Value) -> DomainResult<RowMap> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(DomainError::Schema(format!(
            "expected JSON object row, got {}",
            other
        ))),
    }
}

#[async_trait]
impl ExtractionRepository for PgExtractionRepository {
    async fn fetch_all(&self, table: &TableDescriptor) -> DomainResult<Vec<RowMap>> {
        let sql = build_select(table);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;
        rows.into_iter()
            .map(|row| row_to_map(row.get::<Value, _>("row")))
            .collect()
    }

    async fn fetch_page(
        &self,
        table: &TableDescriptor,
        after: Option<&RowMap>,
        limit: usize,
    ) -> DomainResult<Vec<RowMap>> {
        let sql = build_page_select(table, after.is_some());
        let mut query = sqlx::query(&sql);
        if let Some(last) = after {
            for value in cursor_values(table, last)? {
                query = query.bind(value);
            }
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;
        rows.into_iter()
            .map(|row| row_to_map(row.get::<Value, _>("row")))
            .collect()
    }

    fn stream_rows(&self, table: &TableDescriptor) -> RowStream {
        let sql = build_select(table);
        let pool = self.pool.clone();
        // Bounded channel: the cursor only advances as fast as the consumer
        // drains, and dropping the receiver tears the fetch down.
        let (tx, rx) = mpsc::channel::<DomainResult<RowMap>>(64);

        tokio::spawn(async move {
            let mut rows = sqlx::query(&sql).fetch(&pool);
            while let Some(result) = rows.next().await {
                let item = result
                    .map_err(|e| DomainError::from(DbError::Sqlx(e)))
                    .and_then(|row| row_to_map(row.get::<Value, _>("row")));
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    return;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}
