use std::io::Write;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use sparkify_cli::args::CommonArgs;
use sparkify_cli::{connect, logging, output};
use sparkify_core::config::{ConfigSource, PipelineSettings, S3Settings};
use sparkify_core::loader::staging_requests;
use sparkify_core::pipeline::{self, PipelineOptions};

/// Rebuild the schema, load the staging tables and populate the star schema.
#[derive(Parser, Debug)]
#[clap(name = "sparkify-etl", version)]
struct CliArgs {
    #[clap(flatten)]
    common: CommonArgs,

    /// Wrap each phase in a transaction and stop at the first failure.
    #[clap(long)]
    atomic: bool,

    /// Print row counts and the report queries after loading.
    #[clap(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();
    logging::init(cli.common.json_logs)?;

    let source = ConfigSource::load(&cli.common.config)?;
    let s3 = S3Settings::from_source(&source)?;
    let mut options = PipelineOptions::from(&PipelineSettings::from_source(&source)?);
    options.atomic_phases |= cli.atomic;
    options.run_validation |= cli.validate;

    let warehouse = connect::connect_from(&source).await?;
    let requests = staging_requests(&s3);
    let summary = pipeline::run(warehouse.as_ref(), &requests, &options).await?;

    let mut stdout = std::io::stdout().lock();
    if let Some(validation) = &summary.validation {
        output::write_validation(&mut stdout, validation)?;
    }
    writeln!(stdout, "{}", output::summary_json(&summary))?;

    if !summary.is_success() {
        for e in &summary.errors {
            error!(error = %e, "Pipeline error");
        }
        anyhow::bail!("pipeline finished with {} error(s)", summary.error_count());
    }
    Ok(())
}
