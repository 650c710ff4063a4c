//! Connection provider: one warehouse connection per invocation.

use tracing::info;

use sparkify_core::config::{ConfigSource, ConnectionSettings};
use sparkify_core::{PipelineError, Warehouse};
use sparkify_duckdb::DuckDbBackend;
use sparkify_redshift::RedshiftBackend;

/// Open the backend `settings` describe. The connection closes when the
/// returned box is dropped.
pub async fn connect(settings: &ConnectionSettings) -> Result<Box<dyn Warehouse>, PipelineError> {
    let warehouse: Box<dyn Warehouse> = match settings {
        ConnectionSettings::Redshift(db) => Box::new(
            RedshiftBackend::connect(db)
                .await
                .map_err(PipelineError::Connection)?,
        ),
        ConnectionSettings::DuckDb { path, memory_limit } => Box::new(
            DuckDbBackend::open(path, memory_limit).map_err(PipelineError::Connection)?,
        ),
    };
    info!(backend = %warehouse.dialect(), "Warehouse connection open");
    Ok(warehouse)
}

/// Resolve connection settings from `source`, then connect. Configuration
/// problems surface before any connection attempt.
pub async fn connect_from(source: &ConfigSource) -> Result<Box<dyn Warehouse>, PipelineError> {
    let settings = ConnectionSettings::from_source(source)?;
    connect(&settings).await
}
