//! Configuration source and the typed settings built from it.
//!
//! The file is TOML with one upper-case table per section, mirroring the
//! classic `dwh.cfg` layout:
//!
//! ```toml
//! [DB]
//! HOST = "example.abc123.us-west-2.redshift.amazonaws.com"
//! DB_NAME = "dwh"
//! DB_USER = "dwhuser"
//! DB_PASSWORD = "secret"
//! DB_PORT = 5439
//! ```
//!
//! Every scalar is exposed as a string; callers parse numbers and booleans.
//! Settings are built once at process start and passed down explicitly.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use toml::{Table, Value};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "dwh.toml";

pub const SECTION_AWS: &str = "AWS";
pub const SECTION_CLUSTER: &str = "CLUSTER";
pub const SECTION_DB: &str = "DB";
pub const SECTION_S3: &str = "S3";
pub const SECTION_IAM_ROLE: &str = "IAM_ROLE";
pub const SECTION_WAREHOUSE: &str = "WAREHOUSE";
pub const SECTION_PIPELINE: &str = "PIPELINE";

/// Key-value view over the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    path: PathBuf,
    doc: Table,
}

impl ConfigSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path))
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Self::from_toml_str(path, &content)
    }

    /// Parse `content` as if it had been read from `path`. `save` writes to `path`.
    pub fn from_toml_str(path: impl Into<PathBuf>, content: &str) -> Result<Self, ConfigError> {
        let path = path.into();
        let doc: Table = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value for `[section] key`, or `None` when absent or blank.
    pub fn lookup(&self, section: &str, key: &str) -> Option<String> {
        let value = self.doc.get(section)?.as_table()?.get(key)?;
        scalar_to_string(value).filter(|v| !v.is_empty())
    }

    pub fn get(&self, section: &str, key: &str) -> Result<String, ConfigError> {
        self.lookup(section, key)
            .ok_or_else(|| ConfigError::MissingKey {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    pub fn get_or(&self, section: &str, key: &str, default: &str) -> String {
        self.lookup(section, key)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_parsed<T>(&self, section: &str, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.get(section, key)?;
        parse_value(section, key, &raw)
    }

    pub fn get_parsed_or<T>(&self, section: &str, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.lookup(section, key) {
            Some(raw) => parse_value(section, key, &raw),
            None => Ok(default),
        }
    }

    /// Booleans accept `true/false`, `yes/no`, `on/off` and `1/0`, case-insensitively.
    pub fn get_bool_or(&self, section: &str, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.lookup(section, key) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("expected a boolean, got `{raw}`"),
            }),
        }
    }

    /// Set `[section] key = value` in memory. Call [`ConfigSource::save`] to persist.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let entry = self
            .doc
            .entry(section.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = Value::Table(Table::new());
        }
        if let Value::Table(table) = entry {
            table.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let rendered = toml::to_string_pretty(&self.doc).map_err(|e| ConfigError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, rendered).map_err(|e| ConfigError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Datetime(d) => d.to_string(),
        Value::Array(_) | Value::Table(_) => return None,
    };
    Some(strip_single_quotes(&raw).to_string())
}

/// `'s3://bucket/path'` → `s3://bucket/path`. Older config files quote S3 paths.
fn strip_single_quotes(raw: &str) -> &str {
    raw.strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(raw)
}

fn parse_value<T>(section: &str, key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Typed settings
// ---------------------------------------------------------------------------

/// Static AWS credentials. Both absent means the default provider chain.
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl AwsSettings {
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let access_key_id = source.lookup(SECTION_AWS, "AWS_ACCESS_KEY_ID");
        let secret_access_key = source.lookup(SECTION_AWS, "AWS_SECRET_ACCESS_KEY");
        match (&access_key_id, &secret_access_key) {
            (Some(_), None) => Err(ConfigError::MissingKey {
                section: SECTION_AWS.to_string(),
                key: "AWS_SECRET_ACCESS_KEY".to_string(),
            }),
            (None, Some(_)) => Err(ConfigError::MissingKey {
                section: SECTION_AWS.to_string(),
                key: "AWS_ACCESS_KEY_ID".to_string(),
            }),
            _ => Ok(Self {
                access_key_id,
                secret_access_key,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub region: String,
    pub identifier: String,
    pub cluster_type: String,
    pub node_type: String,
    pub num_nodes: i32,
    pub iam_role_name: String,
    /// Port opened in the security group; defaults to `DB.DB_PORT`.
    pub port: u16,
    pub wait_timeout: Duration,
}

impl ClusterSettings {
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let db_port: u16 = source.get_parsed_or(SECTION_DB, "DB_PORT", 5439)?;
        let wait_timeout_secs: u64 =
            source.get_parsed_or(SECTION_CLUSTER, "WAIT_TIMEOUT_SECS", 30 * 60)?;
        Ok(Self {
            region: source.get(SECTION_CLUSTER, "REGION")?,
            identifier: source.get(SECTION_CLUSTER, "DWH_CLUSTER_IDENTIFIER")?,
            cluster_type: source.get_or(SECTION_CLUSTER, "DWH_CLUSTER_TYPE", "multi-node"),
            node_type: source.get_or(SECTION_CLUSTER, "DWH_NODE_TYPE", "dc2.large"),
            num_nodes: source.get_parsed_or(SECTION_CLUSTER, "DWH_NUM_NODES", 4)?,
            iam_role_name: source.get(SECTION_CLUSTER, "DWH_IAM_ROLE_NAME")?,
            port: source.get_parsed_or(SECTION_CLUSTER, "CLUSTER_PORT", db_port)?,
            wait_timeout: Duration::from_secs(wait_timeout_secs),
        })
    }
}

/// Warehouse login. `host` is empty until the cluster has been provisioned,
/// which is why it is only required when a connection is opened.
#[derive(Clone)]
pub struct DbSettings {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

impl std::fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

impl DbSettings {
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        Ok(Self {
            host: source.get(SECTION_DB, "HOST")?,
            name: source.get(SECTION_DB, "DB_NAME")?,
            user: source.get(SECTION_DB, "DB_USER")?,
            password: source.get(SECTION_DB, "DB_PASSWORD")?,
            port: source.get_parsed(SECTION_DB, "DB_PORT")?,
        })
    }

    /// Credentials needed to create the cluster (no host yet).
    pub fn master_credentials(source: &ConfigSource) -> Result<(String, String, String), ConfigError> {
        Ok((
            source.get(SECTION_DB, "DB_NAME")?,
            source.get(SECTION_DB, "DB_USER")?,
            source.get(SECTION_DB, "DB_PASSWORD")?,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Redshift,
    DuckDb,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redshift" => Ok(Self::Redshift),
            "duckdb" => Ok(Self::DuckDb),
            other => Err(format!("unknown backend `{other}`, expected redshift or duckdb")),
        }
    }
}

/// Everything the connection provider needs.
#[derive(Debug, Clone)]
pub enum ConnectionSettings {
    Redshift(DbSettings),
    /// `path` may be `:memory:`. `memory_limit` is a DuckDB size string.
    DuckDb { path: String, memory_limit: String },
}

impl ConnectionSettings {
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        match backend(source)? {
            Backend::Redshift => Ok(Self::Redshift(DbSettings::from_source(source)?)),
            Backend::DuckDb => Ok(Self::DuckDb {
                path: source.get_or(SECTION_WAREHOUSE, "DUCKDB_PATH", "sparkify.duckdb"),
                memory_limit: source.get_or(SECTION_WAREHOUSE, "DUCKDB_MEMORY_LIMIT", "1GB"),
            }),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::Redshift(_) => Backend::Redshift,
            Self::DuckDb { .. } => Backend::DuckDb,
        }
    }
}

pub fn backend(source: &ConfigSource) -> Result<Backend, ConfigError> {
    source.get_parsed_or(SECTION_WAREHOUSE, "BACKEND", Backend::Redshift)
}

/// Staging sources. On DuckDB the locations are local paths.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub log_data: String,
    pub log_jsonpath: String,
    pub song_data: String,
    pub region: String,
    pub log_max_errors: u32,
    pub song_max_errors: u32,
    /// Required on Redshift, ignored on DuckDB.
    pub iam_role_arn: Option<String>,
}

impl S3Settings {
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let iam_role_arn = match backend(source)? {
            Backend::Redshift => Some(source.get(SECTION_IAM_ROLE, "ARN")?),
            Backend::DuckDb => source.lookup(SECTION_IAM_ROLE, "ARN"),
        };
        Ok(Self {
            log_data: source.get(SECTION_S3, "LOG_DATA")?,
            log_jsonpath: source.get(SECTION_S3, "LOG_JSONPATH")?,
            song_data: source.get(SECTION_S3, "SONG_DATA")?,
            region: source.get_or(SECTION_S3, "REGION", "us-west-2"),
            log_max_errors: source.get_parsed_or(SECTION_S3, "LOG_MAX_ERRORS", 0)?,
            song_max_errors: source.get_parsed_or(SECTION_S3, "SONG_MAX_ERRORS", 50)?,
            iam_role_arn,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Wrap each phase in one transaction and abort the run on the first failure.
    pub atomic_phases: bool,
    pub run_validation: bool,
    /// When set, songplay matches also require `ABS(length - duration) < tolerance`.
    pub song_duration_tolerance: Option<f64>,
    pub sample_rows: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            atomic_phases: false,
            run_validation: false,
            song_duration_tolerance: None,
            sample_rows: 20,
        }
    }
}

impl PipelineSettings {
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let tolerance = match source.lookup(SECTION_PIPELINE, "SONG_DURATION_TOLERANCE") {
            Some(raw) => {
                let value: f64 = parse_value(SECTION_PIPELINE, "SONG_DURATION_TOLERANCE", &raw)?;
                if !value.is_finite() || value <= 0.0 {
                    return Err(ConfigError::InvalidValue {
                        section: SECTION_PIPELINE.to_string(),
                        key: "SONG_DURATION_TOLERANCE".to_string(),
                        reason: "must be a positive number of seconds".to_string(),
                    });
                }
                Some(value)
            }
            None => None,
        };
        Ok(Self {
            atomic_phases: source.get_bool_or(
                SECTION_PIPELINE,
                "ATOMIC_PHASES",
                defaults.atomic_phases,
            )?,
            run_validation: source.get_bool_or(
                SECTION_PIPELINE,
                "RUN_VALIDATION",
                defaults.run_validation,
            )?,
            song_duration_tolerance: tolerance,
            sample_rows: source.get_parsed_or(SECTION_PIPELINE, "SAMPLE_ROWS", defaults.sample_rows)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[AWS]
AWS_ACCESS_KEY_ID = "AKIAEXAMPLE"
AWS_SECRET_ACCESS_KEY = "secret"

[CLUSTER]
REGION = "us-west-2"
DWH_CLUSTER_IDENTIFIER = "dwhCluster"
DWH_NUM_NODES = 2
DWH_IAM_ROLE_NAME = "dwhRole"

[DB]
HOST = ""
DB_NAME = "dwh"
DB_USER = "dwhuser"
DB_PASSWORD = "Passw0rd"
DB_PORT = 5439

[S3]
LOG_DATA = "'s3://udacity-dend/log_data'"
LOG_JSONPATH = "'s3://udacity-dend/log_json_path.json'"
SONG_DATA = "s3://udacity-dend/song_data"

[IAM_ROLE]
ARN = "arn:aws:iam::123456789012:role/dwhRole"
"#;

    fn source() -> ConfigSource {
        ConfigSource::from_toml_str("dwh.toml", SAMPLE).expect("parse sample")
    }

    #[test]
    fn scalars_are_exposed_as_strings() {
        let src = source();
        assert_eq!(src.get("CLUSTER", "DWH_NUM_NODES").expect("nodes"), "2");
        assert_eq!(src.get_parsed::<u16>("DB", "DB_PORT").expect("port"), 5439);
    }

    #[test]
    fn single_quoted_values_are_unquoted() {
        let src = source();
        assert_eq!(
            src.get("S3", "LOG_DATA").expect("log data"),
            "s3://udacity-dend/log_data"
        );
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let err = DbSettings::from_source(&source()).expect_err("host is blank");
        assert!(matches!(
            err,
            ConfigError::MissingKey { ref section, ref key } if section == "DB" && key == "HOST"
        ));
    }

    #[test]
    fn invalid_number_is_reported_with_its_key() {
        let src = ConfigSource::from_toml_str("x.toml", "[DB]\nDB_PORT = \"abc\"\n").expect("parse");
        let err = src.get_parsed::<u16>("DB", "DB_PORT").expect_err("not a port");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn redshift_backend_requires_role_arn() {
        let src = ConfigSource::from_toml_str(
            "x.toml",
            "[S3]\nLOG_DATA = \"a\"\nLOG_JSONPATH = \"b\"\nSONG_DATA = \"c\"\n",
        )
        .expect("parse");
        let err = S3Settings::from_source(&src).expect_err("arn missing");
        assert!(matches!(err, ConfigError::MissingKey { ref key, .. } if key == "ARN"));
    }

    #[test]
    fn duckdb_backend_does_not_need_db_section() {
        let src = ConfigSource::from_toml_str(
            "x.toml",
            "[WAREHOUSE]\nBACKEND = \"duckdb\"\nDUCKDB_PATH = \":memory:\"\n",
        )
        .expect("parse");
        let conn = ConnectionSettings::from_source(&src).expect("duckdb settings");
        assert_eq!(conn.backend(), Backend::DuckDb);
    }

    #[test]
    fn pipeline_defaults_apply_when_section_absent() {
        let settings = PipelineSettings::from_source(&source()).expect("defaults");
        assert!(!settings.atomic_phases);
        assert!(settings.song_duration_tolerance.is_none());
        assert_eq!(settings.sample_rows, 20);
    }

    #[test]
    fn non_positive_duration_tolerance_is_rejected() {
        let src = ConfigSource::from_toml_str(
            "x.toml",
            "[PIPELINE]\nSONG_DURATION_TOLERANCE = 0\n",
        )
        .expect("parse");
        assert!(PipelineSettings::from_source(&src).is_err());
    }

    #[test]
    fn set_and_save_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dwh.toml");
        std::fs::write(&path, SAMPLE).expect("write sample");

        let mut src = ConfigSource::load(&path).expect("load");
        src.set("DB", "HOST", "dwhcluster.abc.us-west-2.redshift.amazonaws.com");
        src.set("IAM_ROLE", "ARN", "arn:aws:iam::123456789012:role/other");
        src.save().expect("save");

        let reloaded = ConfigSource::load(&path).expect("reload");
        assert_eq!(
            reloaded.get("DB", "HOST").expect("host"),
            "dwhcluster.abc.us-west-2.redshift.amazonaws.com"
        );
        assert_eq!(
            reloaded.get("IAM_ROLE", "ARN").expect("arn"),
            "arn:aws:iam::123456789012:role/other"
        );
        assert_eq!(reloaded.get("DB", "DB_USER").expect("user"), "dwhuser");
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = ConfigSource::load("/definitely/not/here/dwh.toml").expect_err("missing");
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
