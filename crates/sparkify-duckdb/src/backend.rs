use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::types::Value;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use sparkify_core::{CopyRequest, Dialect, ResultTable, Warehouse, WarehouseError};

use crate::ingest;

/// Per-connection settings applied at open time.
///
/// An explicit memory limit keeps DuckDB from claiming most of the host RAM;
/// two threads are plenty for single-writer batch loads.
fn init_sql(memory_limit: &str) -> String {
    format!("SET memory_limit = '{memory_limit}';\nSET threads = 2;")
}

fn valid_memory_limit(limit: &str) -> bool {
    !limit.is_empty()
        && limit
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == ' ')
}

/// An embedded DuckDB warehouse.
///
/// DuckDB is single-writer, so the connection sits behind `Arc<Mutex<_>>`
/// and every statement is serialised through it. The struct can still be
/// shared freely between tasks.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
    /// Set between `begin` and `commit`/`rollback`.
    in_transaction: AtomicBool,
}

impl DuckDbBackend {
    /// Open (or create) a database file at `path`; `:memory:` opens an
    /// in-memory database.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self, WarehouseError> {
        if !valid_memory_limit(memory_limit) {
            return Err(WarehouseError::Connection(format!(
                "invalid DuckDB memory limit `{memory_limit}`"
            )));
        }
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| WarehouseError::Connection(e.to_string()))?;
        conn.execute_batch(&init_sql(memory_limit))
            .map_err(|e| WarehouseError::Connection(e.to_string()))?;
        info!(path, memory_limit, threads = 2, "DuckDB opened");
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database. Data is discarded when the struct is
    /// dropped.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        Self::open(":memory:", "1GB")
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            in_transaction: AtomicBool::new(false),
        }
    }

    /// Acquire the connection lock for direct queries.
    ///
    /// Intended for integration tests that need to inspect stored data.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

fn statement_error(e: duckdb::Error) -> WarehouseError {
    WarehouseError::Statement(e.to_string())
}

/// Render a cell as text the way a SQL client would print it.
fn cell_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Boolean(b) => Some(b.to_string()),
        Value::TinyInt(n) => Some(n.to_string()),
        Value::SmallInt(n) => Some(n.to_string()),
        Value::Int(n) => Some(n.to_string()),
        Value::BigInt(n) => Some(n.to_string()),
        Value::HugeInt(n) => Some(n.to_string()),
        Value::UTinyInt(n) => Some(n.to_string()),
        Value::USmallInt(n) => Some(n.to_string()),
        Value::UInt(n) => Some(n.to_string()),
        Value::UBigInt(n) => Some(n.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Double(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Enum(s) => Some(s),
        other => Some(format!("{other:?}")),
    }
}

#[async_trait]
impl Warehouse for DuckDbBackend {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError> {
        let conn = self.conn.lock().await;
        debug!(sql, "DuckDB execute");
        let rows = conn.execute(sql, []).map_err(statement_error)?;
        Ok(rows as u64)
    }

    async fn query(&self, sql: &str) -> Result<ResultTable, WarehouseError> {
        let conn = self.conn.lock().await;
        debug!(sql, "DuckDB query");
        let mut stmt = conn.prepare(sql).map_err(statement_error)?;
        let mut rows = stmt.query([]).map_err(statement_error)?;
        // Column metadata is only available once the statement has run.
        let columns: Vec<String> = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();

        let mut table = ResultTable {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next().map_err(statement_error)? {
            let mut cells = Vec::with_capacity(table.columns.len());
            for idx in 0..table.columns.len() {
                let value: Value = row.get(idx).map_err(statement_error)?;
                cells.push(cell_text(value));
            }
            table.rows.push(cells);
        }
        Ok(table)
    }

    async fn bulk_copy(&self, request: &CopyRequest) -> Result<u64, WarehouseError> {
        let mut conn = self.conn.lock().await;
        let in_transaction = self.in_transaction.load(Ordering::SeqCst);
        ingest::copy_into(&mut conn, request, in_transaction)
    }

    async fn begin(&self) -> Result<(), WarehouseError> {
        self.execute("BEGIN TRANSACTION").await?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<(), WarehouseError> {
        let result = self.execute("COMMIT").await;
        self.in_transaction.store(false, Ordering::SeqCst);
        result.map(|_| ())
    }

    async fn rollback(&self) -> Result<(), WarehouseError> {
        let result = self.execute("ROLLBACK").await;
        self.in_transaction.store(false, Ordering::SeqCst);
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_limit_is_validated() {
        assert!(valid_memory_limit("1GB"));
        assert!(valid_memory_limit("512MB"));
        assert!(!valid_memory_limit(""));
        assert!(!valid_memory_limit("1GB'; DROP TABLE users; --"));
    }

    #[tokio::test]
    async fn query_returns_text_cells_and_nulls() {
        let db = DuckDbBackend::open_in_memory().expect("db");
        let table = db
            .query("SELECT 42 AS answer, NULL AS nothing, 'x' AS letter")
            .await
            .expect("query");
        assert_eq!(table.columns, vec!["answer", "nothing", "letter"]);
        assert_eq!(
            table.rows,
            vec![vec![Some("42".to_string()), None, Some("x".to_string())]]
        );
    }

    #[tokio::test]
    async fn rollback_discards_work() {
        let db = DuckDbBackend::open_in_memory().expect("db");
        db.execute("CREATE TABLE t (n INTEGER)").await.expect("create");
        db.begin().await.expect("begin");
        db.execute("INSERT INTO t VALUES (1)").await.expect("insert");
        db.rollback().await.expect("rollback");
        let table = db.query("SELECT COUNT(*) FROM t").await.expect("count");
        assert_eq!(table.scalar(), Some("0"));
    }

    #[tokio::test]
    async fn invalid_sql_is_a_statement_error() {
        let db = DuckDbBackend::open_in_memory().expect("db");
        let err = db
            .execute("CREATE TABLE")
            .await
            .expect_err("syntax error");
        assert!(matches!(err, WarehouseError::Statement(_)));
    }
}
