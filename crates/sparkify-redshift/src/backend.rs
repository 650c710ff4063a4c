use std::time::Duration;

use async_trait::async_trait;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::{debug, info, warn};

use sparkify_core::config::DbSettings;
use sparkify_core::{CopyRequest, Dialect, ResultTable, Warehouse, WarehouseError};

use crate::copy::render_copy;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A Redshift cluster reached over the PostgreSQL wire protocol.
///
/// Statements go through the simple query protocol, one at a time. The
/// connection task is spawned on the runtime and ends when the client is
/// dropped.
pub struct RedshiftBackend {
    client: Client,
}

/// Connection parameters for `db`, passed structurally rather than through a
/// formatted connection string.
pub fn connection_config(db: &DbSettings) -> Config {
    let mut config = Config::new();
    config
        .host(&db.host)
        .port(db.port)
        .dbname(&db.name)
        .user(&db.user)
        .password(&db.password)
        .application_name("sparkify")
        .connect_timeout(CONNECT_TIMEOUT);
    config
}

fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => e.to_string(),
    }
}

impl RedshiftBackend {
    pub async fn connect(db: &DbSettings) -> Result<Self, WarehouseError> {
        if db.host.trim().is_empty() {
            return Err(WarehouseError::Connection(
                "no warehouse host configured; provision the cluster first".to_string(),
            ));
        }
        let (client, connection) = connection_config(db)
            .connect(NoTls)
            .await
            .map_err(|e| WarehouseError::Connection(describe(&e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "Redshift connection error");
            }
        });

        info!(host = %db.host, port = db.port, dbname = %db.name, "Connected to Redshift");
        Ok(Self { client })
    }

    async fn simple(&self, sql: &str) -> Result<Vec<SimpleQueryMessage>, tokio_postgres::Error> {
        debug!(sql, "Redshift statement");
        self.client.simple_query(sql).await
    }
}

#[async_trait]
impl Warehouse for RedshiftBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError> {
        let messages = self
            .simple(sql)
            .await
            .map_err(|e| WarehouseError::Statement(describe(&e)))?;
        Ok(affected_rows(&messages))
    }

    async fn query(&self, sql: &str) -> Result<ResultTable, WarehouseError> {
        let messages = self
            .simple(sql)
            .await
            .map_err(|e| WarehouseError::Statement(describe(&e)))?;
        Ok(collect_rows(&messages))
    }

    async fn bulk_copy(&self, request: &CopyRequest) -> Result<u64, WarehouseError> {
        let sql = render_copy(request)?;
        let messages = self
            .simple(&sql)
            .await
            .map_err(|e| WarehouseError::Copy(describe(&e)))?;
        Ok(affected_rows(&messages))
    }
}

fn affected_rows(messages: &[SimpleQueryMessage]) -> u64 {
    messages
        .iter()
        .map(|m| match m {
            SimpleQueryMessage::CommandComplete(rows) => *rows,
            _ => 0,
        })
        .sum()
}

/// Column names come from the first row; an empty result has no columns.
fn collect_rows(messages: &[SimpleQueryMessage]) -> ResultTable {
    let mut table = ResultTable::default();
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            if table.columns.is_empty() {
                table.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
            }
            table
                .rows
                .push((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect());
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DbSettings {
        DbSettings {
            host: "dwhcluster.abc123.us-west-2.redshift.amazonaws.com".to_string(),
            name: "dwh".to_string(),
            user: "dwhuser".to_string(),
            password: "Passw0rd".to_string(),
            port: 5439,
        }
    }

    #[test]
    fn config_carries_every_parameter() {
        let config = connection_config(&settings());
        assert_eq!(config.get_dbname(), Some("dwh"));
        assert_eq!(config.get_user(), Some("dwhuser"));
        assert_eq!(config.get_password(), Some(&b"Passw0rd"[..]));
        assert_eq!(config.get_ports(), &[5439]);
        assert_eq!(config.get_connect_timeout(), Some(&CONNECT_TIMEOUT));
    }

    #[test]
    fn password_with_spaces_is_not_split() {
        let mut db = settings();
        db.password = "p ass word='x'".to_string();
        let config = connection_config(&db);
        assert_eq!(config.get_password(), Some("p ass word='x'".as_bytes()));
    }

    #[tokio::test]
    async fn empty_host_fails_before_any_network_call() {
        let mut db = settings();
        db.host = String::new();
        let err = RedshiftBackend::connect(&db).await.err().expect("no host");
        assert!(matches!(err, WarehouseError::Connection(_)));
    }

    #[test]
    fn affected_rows_sums_command_completions() {
        let messages = vec![
            SimpleQueryMessage::CommandComplete(3),
            SimpleQueryMessage::CommandComplete(4),
        ];
        assert_eq!(affected_rows(&messages), 7);
        assert!(collect_rows(&messages).is_empty());
    }
}
