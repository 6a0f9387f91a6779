pub mod service;
pub mod types;

pub use service::{order_by_dependencies, PgSchemaDiscovery, SchemaDiscovery};
pub use types::{CategoryTables, TableDescriptor};
