use std::collections::HashMap;

/// Maps physical schema names to the friendly names used in export payloads.
pub trait ExportMapper: Send + Sync {
    /// Friendly table name, e.g. `cmis.social_posts` -> `social_posts`.
    fn table_friendly_name(&self, table: &str) -> String;

    /// Friendly column name for a table's column.
    fn column_friendly_name(&self, table: &str, column: &str) -> String;
}

/// Default mapping: strip the schema qualifier from table names and pass
/// column names through, with optional per-table/per-column overrides for
/// legacy columns whose physical names are unreadable in an export.
#[derive(Default)]
pub struct DefaultExportMapper {
    /// (table, column) -> export name
    column_overrides: HashMap<(String, String), String>,
    /// table -> export name
    table_overrides: HashMap<String, String>,
}

impl DefaultExportMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_override(mut self, table: &str, name: &str) -> Self {
        self.table_overrides
            .insert(table.to_string(), name.to_string());
        self
    }

    pub fn with_column_override(mut self, table: &str, column: &str, name: &str) -> Self {
        self.column_overrides
            .insert((table.to_string(), column.to_string()), name.to_string());
        self
    }
}

impl ExportMapper for DefaultExportMapper {
    fn table_friendly_name(&self, table: &str) -> String {
        if let Some(name) = self.table_overrides.get(table) {
            return name.clone();
        }
        table
            .rsplit_once('.')
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| table.to_string())
    }

    fn column_friendly_name(&self, table: &str, column: &str) -> String {
        self.column_overrides
            .get(&(table.to_string(), column.to_string()))
            .cloned()
            .unwrap_or_else(|| column.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_drops_schema() {
        let mapper = DefaultExportMapper::new();
        assert_eq!(
            mapper.table_friendly_name("cmis.social_posts"),
            "social_posts"
        );
        assert_eq!(mapper.table_friendly_name("campaigns"), "campaigns");
    }

    #[test]
    fn overrides_win() {
        let mapper = DefaultExportMapper::new()
            .with_table_override("cmis.unified_metrics", "metrics")
            .with_column_override("cmis.unified_metrics", "val_num", "value");
        assert_eq!(mapper.table_friendly_name("cmis.unified_metrics"), "metrics");
        assert_eq!(
            mapper.column_friendly_name("cmis.unified_metrics", "val_num"),
            "value"
        );
        assert_eq!(
            mapper.column_friendly_name("cmis.unified_metrics", "org_id"),
            "org_id"
        );
    }
}
