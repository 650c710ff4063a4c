use sparkify_cli::connect::connect_from;
use sparkify_core::config::ConfigSource;
use sparkify_core::{ConfigError, Dialect, PipelineError};

#[tokio::test]
async fn missing_db_section_is_a_config_error() {
    let source = ConfigSource::from_toml_str(
        "dwh.toml",
        "[WAREHOUSE]\nBACKEND = \"redshift\"\n",
    )
    .expect("parse");
    let err = connect_from(&source).await.err().expect("no DB section");
    match err {
        PipelineError::Config(ConfigError::MissingKey { section, .. }) => {
            assert_eq!(section, "DB");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn unknown_backend_is_rejected() {
    let source = ConfigSource::from_toml_str("dwh.toml", "[WAREHOUSE]\nBACKEND = \"oracle\"\n")
        .expect("parse");
    let err = connect_from(&source).await.err().expect("bad backend");
    assert!(matches!(err, PipelineError::Config(_)));
}

#[tokio::test]
async fn duckdb_in_memory_connects() {
    let source = ConfigSource::from_toml_str(
        "dwh.toml",
        "[WAREHOUSE]\nBACKEND = \"duckdb\"\nDUCKDB_PATH = \":memory:\"\n",
    )
    .expect("parse");
    let warehouse = connect_from(&source).await.expect("connect");
    assert_eq!(warehouse.dialect(), Dialect::DuckDb);
    let table = warehouse.query("SELECT 1").await.expect("query");
    assert_eq!(table.scalar(), Some("1"));
}

#[tokio::test]
async fn duckdb_file_is_created_on_connect() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sparkify.duckdb");
    let content = format!(
        "[WAREHOUSE]\nBACKEND = \"duckdb\"\nDUCKDB_PATH = \"{}\"\nDUCKDB_MEMORY_LIMIT = \"256MB\"\n",
        path.display()
    );
    let source = ConfigSource::from_toml_str("dwh.toml", &content).expect("parse");
    let warehouse = connect_from(&source).await.expect("connect");
    warehouse.execute("CREATE TABLE t (n INTEGER)").await.expect("create");
    drop(warehouse);
    assert!(path.exists());
}
