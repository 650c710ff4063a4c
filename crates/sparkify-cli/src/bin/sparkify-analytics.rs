use std::io::Write;

use anyhow::Result;
use clap::Parser;

use sparkify_cli::args::CommonArgs;
use sparkify_cli::{connect, logging, output};
use sparkify_core::config::{ConfigSource, PipelineSettings};
use sparkify_core::validate;

/// Print table samples, row counts and the analytics queries.
#[derive(Parser, Debug)]
#[clap(name = "sparkify-analytics", version)]
struct CliArgs {
    #[clap(flatten)]
    common: CommonArgs,

    /// Rows sampled from each table; overrides `PIPELINE.SAMPLE_ROWS`.
    #[clap(long)]
    sample_rows: Option<u32>,

    /// Skip the random table samples.
    #[clap(long)]
    no_samples: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();
    logging::init(cli.common.json_logs)?;

    let source = ConfigSource::load(&cli.common.config)?;
    let settings = PipelineSettings::from_source(&source)?;
    let warehouse = connect::connect_from(&source).await?;

    let mut stdout = std::io::stdout().lock();
    if !cli.no_samples {
        let limit = cli.sample_rows.unwrap_or(settings.sample_rows);
        let samples = validate::sample_tables(warehouse.as_ref(), limit).await;
        output::write_outcomes(&mut stdout, &samples)?;
        writeln!(stdout)?;
    }

    let report = validate::validate(warehouse.as_ref()).await;
    output::write_validation(&mut stdout, &report)?;

    if let Err(e) = report.counts {
        anyhow::bail!("row counts failed: {e}");
    }
    Ok(())
}
