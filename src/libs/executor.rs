use async_trait::async_trait;

use crate::libs::error::Result;
use crate::libs::record::Record;
use crate::libs::schema::TableSchema;

/// A single statement against one table, independent of SQL dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Rows whose columns equal every value in `filter`.
    Select {
        filter: Record,
        order_by: Vec<String>,
        limit: Option<u32>,
    },
    /// Create one row. Absent columns are left to the store.
    Insert { record: Record },
    /// Set `values` on the rows matching `key`.
    Update { key: Record, values: Record },
}

/// Runs operations and hands back the affected rows.
///
/// Implementations translate store failures into classified
/// [`OrmError`](crate::OrmError) variants before returning them.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, table: &TableSchema, op: &Operation) -> Result<Vec<Record>>;
}
