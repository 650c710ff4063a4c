use tracing::{debug, info};

use crate::error::SchemaError;
use crate::tables::{TableDef, ALL_TABLES};
use crate::warehouse::Warehouse;

/// Drop every known table (fact first). Safe to call when tables are absent.
pub async fn drop_all(warehouse: &dyn Warehouse) -> Result<(), SchemaError> {
    let dialect = warehouse.dialect();
    for table in ALL_TABLES.iter().rev() {
        for sql in table.drop_statements(dialect) {
            run(warehouse, table, &sql).await?;
        }
        debug!(table = table.name, "Dropped table");
    }
    info!(tables = ALL_TABLES.len(), "Dropped schema");
    Ok(())
}

/// Create the staging tables, then the dimensions, then the fact table.
///
/// Fails on the first statement the engine rejects (for example a table that
/// already exists); nothing is retried.
pub async fn create_all(warehouse: &dyn Warehouse) -> Result<(), SchemaError> {
    let dialect = warehouse.dialect();
    for table in ALL_TABLES {
        for sql in table.create_statements(dialect) {
            run(warehouse, table, &sql).await?;
        }
        info!(table = table.name, kind = ?table.kind, "Created table");
    }
    Ok(())
}

async fn run(warehouse: &dyn Warehouse, table: &TableDef, sql: &str) -> Result<(), SchemaError> {
    debug!(table = table.name, sql, "Executing DDL");
    warehouse
        .execute(sql)
        .await
        .map(|_| ())
        .map_err(|source| SchemaError {
            table: table.name.to_string(),
            source,
        })
}
