//! One pipeline run: schema (drop + create) → staging load → transform, then
//! optionally validation.
//!
//! Two failure modes:
//! - best effort (default): every statement commits on its own. A failing
//!   phase is logged, recorded in the summary and the next phase still runs,
//!   so a failed run can leave the warehouse partially populated.
//! - atomic: each phase runs inside one transaction; the first failure rolls
//!   the phase back and aborts the run.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::loader::{self, LoadReport};
use crate::schema;
use crate::transform::{self, FailurePolicy, TransformOptions, TransformReport};
use crate::validate::{self, ValidationReport};
use crate::warehouse::{CopyRequest, Warehouse};

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub atomic_phases: bool,
    pub run_validation: bool,
    pub transform: TransformOptions,
}

impl From<&PipelineSettings> for PipelineOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            atomic_phases: settings.atomic_phases,
            run_validation: settings.run_validation,
            transform: TransformOptions {
                song_duration_tolerance: settings.song_duration_tolerance,
            },
        }
    }
}

#[derive(Debug)]
pub struct PipelineSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub load: Option<LoadReport>,
    pub transform: Option<TransformReport>,
    pub validation: Option<ValidationReport>,
    /// Schema and load failures recorded in best-effort mode. Transform
    /// failures stay in [`PipelineSummary::transform`].
    pub errors: Vec<PipelineError>,
}

impl PipelineSummary {
    pub fn error_count(&self) -> usize {
        let transform_failures = self
            .transform
            .as_ref()
            .map_or(0, |report| report.failures().count());
        self.errors.len() + transform_failures
    }

    pub fn is_success(&self) -> bool {
        self.error_count() == 0
    }
}

/// Run the whole pipeline over an open connection.
///
/// Returns `Err` only in atomic mode (first failing phase) or when
/// transaction control itself fails. In best-effort mode phase failures are
/// collected in [`PipelineSummary::errors`].
pub async fn run(
    warehouse: &dyn Warehouse,
    requests: &[CopyRequest],
    options: &PipelineOptions,
) -> Result<PipelineSummary, PipelineError> {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("pipeline", %run_id, dialect = %warehouse.dialect());
    run_inner(warehouse, requests, options, run_id)
        .instrument(span)
        .await
}

async fn run_inner(
    warehouse: &dyn Warehouse,
    requests: &[CopyRequest],
    options: &PipelineOptions,
    run_id: Uuid,
) -> Result<PipelineSummary, PipelineError> {
    let started_at = Utc::now();
    info!(atomic = options.atomic_phases, "Pipeline started");

    let mut summary = PipelineSummary {
        run_id,
        started_at,
        finished_at: started_at,
        load: None,
        transform: None,
        validation: None,
        errors: Vec::new(),
    };

    if options.atomic_phases {
        run_atomic(warehouse, requests, options, &mut summary).await?;
    } else {
        run_best_effort(warehouse, requests, options, &mut summary).await;
    }

    if options.run_validation {
        summary.validation = Some(validate::validate(warehouse).await);
    }

    summary.finished_at = Utc::now();
    let elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds();
    if summary.is_success() {
        info!(elapsed_ms, "Pipeline finished");
    } else {
        warn!(
            elapsed_ms,
            errors = summary.error_count(),
            "Pipeline finished with errors"
        );
    }
    Ok(summary)
}

async fn run_best_effort(
    warehouse: &dyn Warehouse,
    requests: &[CopyRequest],
    options: &PipelineOptions,
    summary: &mut PipelineSummary,
) {
    let schema_result = async {
        schema::drop_all(warehouse).await?;
        schema::create_all(warehouse).await
    }
    .await;
    if let Err(e) = schema_result {
        error!(error = %e, "Schema phase failed, continuing");
        summary.errors.push(e.into());
    }

    match loader::load_staging(warehouse, requests).await {
        Ok(report) => summary.load = Some(report),
        Err(e) => {
            error!(error = %e, "Load phase failed, continuing");
            summary.errors.push(e.into());
        }
    }

    let report =
        transform::populate(warehouse, &options.transform, FailurePolicy::BestEffort).await;
    summary.transform = Some(report);
}

async fn run_atomic(
    warehouse: &dyn Warehouse,
    requests: &[CopyRequest],
    options: &PipelineOptions,
    summary: &mut PipelineSummary,
) -> Result<(), PipelineError> {
    in_transaction(warehouse, "schema", async {
        schema::drop_all(warehouse).await?;
        schema::create_all(warehouse).await?;
        Ok(())
    })
    .await?;

    let load = in_transaction(warehouse, "load", async {
        Ok(loader::load_staging(warehouse, requests).await?)
    })
    .await?;
    summary.load = Some(load);

    let report = in_transaction(warehouse, "transform", async {
        let report =
            transform::populate(warehouse, &options.transform, FailurePolicy::StopOnError).await;
        Ok(report.into_result()?)
    })
    .await?;
    summary.transform = Some(report);

    Ok(())
}

async fn in_transaction<T, F>(
    warehouse: &dyn Warehouse,
    phase: &'static str,
    body: F,
) -> Result<T, PipelineError>
where
    F: std::future::Future<Output = Result<T, PipelineError>>,
{
    warehouse.begin().await.map_err(PipelineError::Transaction)?;
    match body.await {
        Ok(value) => {
            warehouse
                .commit()
                .await
                .map_err(PipelineError::Transaction)?;
            info!(phase, "Phase committed");
            Ok(value)
        }
        Err(e) => {
            error!(phase, error = %e, "Phase failed, rolling back");
            if let Err(rollback) = warehouse.rollback().await {
                error!(phase, error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
