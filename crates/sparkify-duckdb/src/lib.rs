pub mod backend;
pub mod ingest;
pub mod jsonpath;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so tests can inspect the database directly
/// without an extra dependency.
pub use duckdb;
