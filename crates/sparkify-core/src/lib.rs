pub mod config;
pub mod dialect;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod render;
pub mod schema;
pub mod tables;
pub mod transform;
pub mod validate;
pub mod warehouse;

pub use dialect::Dialect;
pub use error::{
    ConfigError, LoadError, PipelineError, ProvisioningError, ReportError, SchemaError,
    TransformError, WarehouseError,
};
pub use warehouse::{CopyCredentials, CopyRequest, JsonFormat, ResultTable, Warehouse};
