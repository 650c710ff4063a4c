use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Level is controlled via `RUST_LOG`; logs
/// go to stderr so stdout carries only report output.
pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("sparkify=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
