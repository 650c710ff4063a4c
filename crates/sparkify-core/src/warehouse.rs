//! Warehouse abstraction.

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::WarehouseError;
use crate::tables::TableDef;

/// Rows returned by a query, every cell rendered as text (`None` for NULL).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First cell of the first row.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// All values of the named column, in row order.
    pub fn column_values(&self, name: &str) -> Vec<Option<&str>> {
        let Some(idx) = self.column_index(name) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|row| row.get(idx).and_then(|v| v.as_deref()))
            .collect()
    }
}

/// How JSON documents map onto staging columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonFormat {
    /// Keys are matched to column names.
    Auto,
    /// A JSON-paths file listing one path per column, in column order.
    Paths(String),
}

/// Credentials the warehouse uses to read the source bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCredentials {
    pub iam_role: Option<String>,
    pub region: String,
}

/// One bulk load of external JSON data into a staging table.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub table: &'static TableDef,
    pub source: String,
    pub format: JsonFormat,
    pub credentials: CopyCredentials,
    /// Malformed records tolerated before the load fails.
    pub max_errors: u32,
    /// Whitespace-only strings load as NULL.
    pub blanks_as_null: bool,
    /// Empty strings load as NULL.
    pub empty_as_null: bool,
    /// Over-long strings are cut to the column width instead of failing.
    pub truncate_columns: bool,
}

/// A single open connection to the warehouse.
///
/// Statements are issued one at a time and each call blocks (awaits) until
/// the engine answers. Outside an explicit [`Warehouse::begin`] every
/// statement commits on its own. The connection closes when the value is
/// dropped.
#[async_trait]
pub trait Warehouse: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run one statement, returning the number of affected rows when the
    /// engine reports it.
    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError>;

    async fn query(&self, sql: &str) -> Result<ResultTable, WarehouseError>;

    /// Load external data into a staging table, returning rows loaded.
    async fn bulk_copy(&self, request: &CopyRequest) -> Result<u64, WarehouseError>;

    async fn begin(&self) -> Result<(), WarehouseError> {
        self.execute("BEGIN").await.map(|_| ())
    }

    async fn commit(&self) -> Result<(), WarehouseError> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&self) -> Result<(), WarehouseError> {
        self.execute("ROLLBACK").await.map(|_| ())
    }
}
