use serde::{Deserialize, Serialize};

/// Everything the extractor needs to know about one table before touching it.
///
/// Derived on demand from schema discovery and never persisted. The row count
/// drives strategy selection and goes stale under concurrent writes, so it is
/// refreshed immediately before each strategy decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema-qualified name, e.g. `cmis.social_posts`
    pub qualified_name: String,
    pub category_key: String,
    pub category_label: String,
    pub has_soft_delete: bool,
    pub has_timestamp: bool,
    pub row_count: i64,
}

impl TableDescriptor {
    /// Table name without the schema qualifier.
    pub fn base_name(&self) -> &str {
        self.qualified_name
            .rsplit_once('.')
            .map(|(_, name)| name)
            .unwrap_or(&self.qualified_name)
    }
}

/// One discovered category: its label and member tables (unordered — the
/// dependency resolver decides extraction order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTables {
    pub label: String,
    pub tables: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_schema() {
        let desc = TableDescriptor {
            qualified_name: "cmis.social_posts".into(),
            category_key: "social_posts".into(),
            category_label: "Social Posts".into(),
            has_soft_delete: true,
            has_timestamp: true,
            row_count: 0,
        };
        assert_eq!(desc.base_name(), "social_posts");
    }

    #[test]
    fn base_name_passes_through_unqualified() {
        let desc = TableDescriptor {
            qualified_name: "campaigns".into(),
            category_key: "campaigns".into(),
            category_label: "Campaigns".into(),
            has_soft_delete: false,
            has_timestamp: false,
            row_count: 0,
        };
        assert_eq!(desc.base_name(), "campaigns");
    }
}
