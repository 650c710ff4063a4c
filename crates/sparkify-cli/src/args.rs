use std::path::PathBuf;

use clap::Args;

use sparkify_core::config::DEFAULT_CONFIG_PATH;

/// Flags shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the TOML configuration file.
    #[clap(long, env = "SPARKIFY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Emit logs as JSON lines instead of human-readable text.
    #[clap(long)]
    pub json_logs: bool,
}
