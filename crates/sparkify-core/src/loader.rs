use tracing::info;

use crate::config::S3Settings;
use crate::error::LoadError;
use crate::tables::{STAGING_EVENTS, STAGING_SONGS};
use crate::warehouse::{CopyCredentials, CopyRequest, JsonFormat, Warehouse};

/// The two staging loads: event logs through an explicit JSON-paths file,
/// song metadata with automatic key matching.
pub fn staging_requests(s3: &S3Settings) -> Vec<CopyRequest> {
    let credentials = CopyCredentials {
        iam_role: s3.iam_role_arn.clone(),
        region: s3.region.clone(),
    };
    vec![
        CopyRequest {
            table: &STAGING_EVENTS,
            source: s3.log_data.clone(),
            format: JsonFormat::Paths(s3.log_jsonpath.clone()),
            credentials: credentials.clone(),
            max_errors: s3.log_max_errors,
            blanks_as_null: true,
            empty_as_null: true,
            truncate_columns: true,
        },
        CopyRequest {
            table: &STAGING_SONGS,
            source: s3.song_data.clone(),
            format: JsonFormat::Auto,
            credentials,
            max_errors: s3.song_max_errors,
            blanks_as_null: true,
            empty_as_null: true,
            truncate_columns: true,
        },
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<(&'static str, u64)>,
}

impl LoadReport {
    pub fn rows_for(&self, table: &str) -> Option<u64> {
        self.loaded
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, rows)| *rows)
    }
}

/// Run each copy in turn. Each one commits on its own; the first failure
/// stops the loader and earlier loads stay in place.
pub async fn load_staging(
    warehouse: &dyn Warehouse,
    requests: &[CopyRequest],
) -> Result<LoadReport, LoadError> {
    let mut report = LoadReport::default();
    for request in requests {
        info!(table = request.table.name, source = %request.source, "Copying into staging table");
        let rows = warehouse
            .bulk_copy(request)
            .await
            .map_err(|source| LoadError {
                table: request.table.name.to_string(),
                source,
            })?;
        info!(table = request.table.name, rows, "Staging copy complete");
        report.loaded.push((request.table.name, rows));
    }
    Ok(report)
}
