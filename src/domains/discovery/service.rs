use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::BackupConfig;
use crate::domains::discovery::types::CategoryTables;
use crate::errors::{DbError, DomainError, DomainResult};

/// Schema facts the extractor consumes: row counts, soft-delete/timestamp
/// column presence, category grouping, and foreign-key extraction order.
///
/// Row counts are implicitly scoped to the active tenant context — callers
/// must have initialized it before asking.
#[async_trait]
pub trait SchemaDiscovery: Send + Sync {
    async fn row_count(&self, table: &str) -> DomainResult<i64>;

    async fn has_soft_deletes(&self, table: &str) -> DomainResult<bool>;

    async fn has_timestamps(&self, table: &str) -> DomainResult<bool>;

    /// All org-scoped tables grouped by business category, in discovery order.
    async fn discover_by_category(&self) -> DomainResult<Vec<(String, CategoryTables)>>;

    /// Order tables so that referenced tables precede referencing tables.
    async fn resolve_extraction_order(&self, tables: &[String]) -> DomainResult<Vec<String>>;
}

/// Postgres-backed discovery reading `information_schema`, combined with the
/// configured category mapping and auto-categorization patterns.
pub struct PgSchemaDiscovery {
    pool: PgPool,
    config: BackupConfig,
}

impl PgSchemaDiscovery {
    pub fn new(pool: PgPool, config: BackupConfig) -> Self {
        Self { pool, config }
    }

    fn split_qualified(table: &str) -> DomainResult<(&str, &str)> {
        table
            .split_once('.')
            .ok_or_else(|| DomainError::Schema(format!("table name not schema-qualified: {}", table)))
    }

    async fn has_column(&self, table: &str, column: &str) -> DomainResult<bool> {
        let (schema, name) = Self::split_qualified(table)?;
        let row = sqlx::query(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
             ) AS present",
        )
        .bind(schema)
        .bind(name)
        .bind(column)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;
        Ok(row.get::<bool, _>("present"))
    }

    /// All tables in the configured schemas that carry an `org_id` column,
    /// minus the exclusion list.
    async fn discover_org_tables(&self) -> DomainResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT table_schema || '.' || table_name AS qualified_name
             FROM information_schema.columns
             WHERE column_name = 'org_id' AND table_schema = ANY($1)
             ORDER BY table_schema, table_name",
        )
        .bind(&self.config.discovery_schemas)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("qualified_name"))
            .filter(|name| !self.config.excluded_tables.contains(name))
            .collect())
    }

    /// Foreign-key edges (referencing, referenced) among the given tables.
    async fn foreign_key_edges(&self, tables: &[String]) -> DomainResult<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT
                 tc.table_schema || '.' || tc.table_name AS referencing,
                 ccu.table_schema || '.' || ccu.table_name AS referenced
             FROM information_schema.table_constraints tc
             JOIN information_schema.constraint_column_usage ccu
               ON ccu.constraint_name = tc.constraint_name
              AND ccu.constraint_schema = tc.constraint_schema
             WHERE tc.constraint_type = 'FOREIGN KEY'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        let wanted: HashSet<&str> = tables.iter().map(String::as_str).collect();
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<String, _>("referencing"),
                    row.get::<String, _>("referenced"),
                )
            })
            .filter(|(from, to)| {
                from != to && wanted.contains(from.as_str()) && wanted.contains(to.as_str())
            })
            .collect())
    }

    fn label_for(&self, key: &str) -> String {
        self.config
            .category_labels
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[async_trait]
impl SchemaDiscovery for PgSchemaDiscovery {
    async fn row_count(&self, table: &str) -> DomainResult<i64> {
        // Qualified name comes from information_schema discovery, not user
        // input, so interpolation is safe here.
        Self::split_qualified(table)?;
        let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;
        Ok(row.get::<i64, _>("count"))
    }

    async fn has_soft_deletes(&self, table: &str) -> DomainResult<bool> {
        self.has_column(table, "deleted_at").await
    }

    async fn has_timestamps(&self, table: &str) -> DomainResult<bool> {
        self.has_column(table, "created_at").await
    }

    async fn discover_by_category(&self) -> DomainResult<Vec<(String, CategoryTables)>> {
        let org_tables = self.discover_org_tables().await?;
        let mut categories: Vec<(String, CategoryTables)> = Vec::new();
        let mut assigned: HashSet<String> = HashSet::new();

        // Explicit mapping first, in configured order; only tables that
        // actually exist in this installation are kept.
        let existing: HashSet<&str> = org_tables.iter().map(String::as_str).collect();
        for (key, tables) in &self.config.category_mapping {
            let present: Vec<String> = tables
                .iter()
                .filter(|t| existing.contains(t.as_str()))
                .cloned()
                .collect();
            for table in &present {
                assigned.insert(table.clone());
            }
            if !present.is_empty() {
                categories.push((
                    key.clone(),
                    CategoryTables {
                        label: self.label_for(key),
                        tables: present,
                    },
                ));
            }
        }

        // Unmapped tables fall through to pattern matching, then "other".
        for table in &org_tables {
            if assigned.contains(table) {
                continue;
            }
            let key = categorize_by_pattern(table, &self.config.category_patterns)
                .unwrap_or_else(|| "other".to_string());
            match categories.iter_mut().find(|(k, _)| *k == key) {
                Some((_, entry)) => entry.tables.push(table.clone()),
                None => categories.push((
                    key.clone(),
                    CategoryTables {
                        label: self.label_for(&key),
                        tables: vec![table.clone()],
                    },
                )),
            }
        }

        Ok(categories)
    }

    async fn resolve_extraction_order(&self, tables: &[String]) -> DomainResult<Vec<String>> {
        let edges = self.foreign_key_edges(tables).await?;
        Ok(order_by_dependencies(tables, &edges))
    }
}

/// Match a table's base name against the configured category patterns.
pub fn categorize_by_pattern(table: &str, patterns: &[(String, Vec<String>)]) -> Option<String> {
    let base = table.rsplit_once('.').map(|(_, n)| n).unwrap_or(table);
    for (key, pats) in patterns {
        if pats.iter().any(|p| base.contains(p.as_str())) {
            return Some(key.clone());
        }
    }
    None
}

/// Topologically order `tables` so that every table appears after the tables
/// it references. `edges` are (referencing, referenced) pairs. Input order is
/// the tie-break, so the result is deterministic; a cycle degrades to input
/// order for the tables involved rather than dropping them.
pub fn order_by_dependencies(tables: &[String], edges: &[(String, String)]) -> Vec<String> {
    let index: HashMap<&str, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    // in_degree counts unresolved references from each table
    let mut in_degree = vec![0usize; tables.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
    for (from, to) in edges {
        if let (Some(&f), Some(&t)) = (index.get(from.as_str()), index.get(to.as_str())) {
            in_degree[f] += 1;
            dependents[t].push(f);
        }
    }

    let mut ready: VecDeque<usize> = (0..tables.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut ordered = Vec::with_capacity(tables.len());
    let mut emitted = vec![false; tables.len()];

    while let Some(i) = ready.pop_front() {
        emitted[i] = true;
        ordered.push(tables[i].clone());
        for &dep in &dependents[i] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                ready.push_back(dep);
            }
        }
        // Keep the queue in input order for determinism
        let mut sorted: Vec<usize> = ready.drain(..).collect();
        sorted.sort_unstable();
        ready.extend(sorted);
    }

    // Cycle fallback: append anything not emitted, in input order
    for (i, table) in tables.iter().enumerate() {
        if !emitted[i] {
            ordered.push(table.clone());
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dependency_chain_is_ordered_referenced_first() {
        // posts -> campaigns -> orgs, discovered in scrambled order
        let tables = names(&["cmis.posts", "cmis.orgs", "cmis.campaigns"]);
        let edges = vec![
            ("cmis.posts".to_string(), "cmis.campaigns".to_string()),
            ("cmis.campaigns".to_string(), "cmis.orgs".to_string()),
        ];
        let ordered = order_by_dependencies(&tables, &edges);
        assert_eq!(
            ordered,
            names(&["cmis.orgs", "cmis.campaigns", "cmis.posts"])
        );
    }

    #[test]
    fn independent_tables_keep_input_order() {
        let tables = names(&["cmis.b", "cmis.a", "cmis.c"]);
        let ordered = order_by_dependencies(&tables, &[]);
        assert_eq!(ordered, tables);
    }

    #[test]
    fn cycle_falls_back_to_input_order() {
        let tables = names(&["cmis.x", "cmis.y"]);
        let edges = vec![
            ("cmis.x".to_string(), "cmis.y".to_string()),
            ("cmis.y".to_string(), "cmis.x".to_string()),
        ];
        let ordered = order_by_dependencies(&tables, &edges);
        assert_eq!(ordered, tables);
    }

    #[test]
    fn edges_to_unknown_tables_are_ignored() {
        let tables = names(&["cmis.a"]);
        let edges = vec![("cmis.a".to_string(), "cmis.missing".to_string())];
        let ordered = order_by_dependencies(&tables, &edges);
        assert_eq!(ordered, tables);
    }

    #[test]
    fn pattern_categorization_matches_base_name() {
        let patterns = vec![(
            "campaigns".to_string(),
            vec!["campaign".to_string(), "ad_".to_string()],
        )];
        assert_eq!(
            categorize_by_pattern("cmis.campaign_budgets", &patterns),
            Some("campaigns".to_string())
        );
        assert_eq!(
            categorize_by_pattern("cmis.ad_creatives", &patterns),
            Some("campaigns".to_string())
        );
        assert_eq!(categorize_by_pattern("cmis.user_notes", &patterns), None);
    }
}
