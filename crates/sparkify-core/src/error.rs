use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to resolve configuration. Always raised before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required key [{section}] {key}")]
    MissingKey { section: String, key: String },

    #[error("invalid value for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },

    #[error("failed to write config file {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}

/// Error reported by a warehouse engine (or its driver) for one statement.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("bulk copy failed: {0}")]
    Copy(String),

    #[error("invalid copy request: {0}")]
    InvalidCopy(String),
}

#[derive(Debug, Error)]
#[error("schema statement for table `{table}` failed: {source}")]
pub struct SchemaError {
    pub table: String,
    #[source]
    pub source: WarehouseError,
}

#[derive(Debug, Error)]
#[error("bulk copy into `{table}` failed: {source}")]
pub struct LoadError {
    pub table: String,
    #[source]
    pub source: WarehouseError,
}

#[derive(Debug, Error)]
#[error("insert into `{table}` failed: {source}")]
pub struct TransformError {
    pub table: String,
    #[source]
    pub source: WarehouseError,
}

#[derive(Debug, Error)]
#[error("report query `{query}` failed: {source}")]
pub struct ReportError {
    pub query: String,
    #[source]
    pub source: WarehouseError,
}

/// Failure talking to the cloud provider while provisioning or tearing down.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("{operation} failed: {message}")]
    Api { operation: String, message: String },

    #[error("cluster `{cluster}` did not reach state `{target}` within {waited:?}")]
    Timeout {
        cluster: String,
        target: String,
        waited: Duration,
    },

    #[error("unexpected response from {operation}: {message}")]
    UnexpectedResponse { operation: String, message: String },
}

impl ProvisioningError {
    pub fn api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Top-level error of a pipeline or analytics run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to warehouse: {0}")]
    Connection(WarehouseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error("transaction control failed: {0}")]
    Transaction(WarehouseError),
}
