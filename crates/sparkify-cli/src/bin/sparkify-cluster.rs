use anyhow::Result;
use clap::Parser;
use tracing::info;

use sparkify_cli::args::CommonArgs;
use sparkify_cli::logging;
use sparkify_cli::provision::{sdk_config, MasterCredentials, Provisioner};
use sparkify_core::config::{
    AwsSettings, ClusterSettings, ConfigSource, DbSettings, SECTION_DB, SECTION_IAM_ROLE,
};

/// Provision or tear down the Redshift cluster that hosts the warehouse.
#[derive(Parser, Debug)]
#[clap(name = "sparkify-cluster", version)]
struct CliArgs {
    #[clap(flatten)]
    common: CommonArgs,

    /// Delete the cluster, its IAM role and the ingress rule instead of
    /// creating them.
    #[clap(long)]
    delete: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();
    logging::init(cli.common.json_logs)?;

    let mut source = ConfigSource::load(&cli.common.config)?;
    let aws = AwsSettings::from_source(&source)?;
    let cluster = ClusterSettings::from_source(&source)?;
    let sdk = sdk_config(&aws, &cluster.region).await;
    let provisioner = Provisioner::new(&sdk, cluster);

    if cli.delete {
        provisioner.delete().await?;
        source.set(SECTION_DB, "HOST", "");
        source.save()?;
        println!("cluster deleted");
        return Ok(());
    }

    let (db_name, user, password) = DbSettings::master_credentials(&source)?;
    let master = MasterCredentials {
        db_name,
        user,
        password,
    };
    let provisioned = provisioner.create(&master).await?;

    source.set(SECTION_DB, "HOST", &provisioned.endpoint);
    source.set(SECTION_IAM_ROLE, "ARN", &provisioned.role_arn);
    source.save()?;
    info!(config = %source.path().display(), "Endpoint and role ARN written to config");

    println!("endpoint: {}", provisioned.endpoint);
    println!("role_arn: {}", provisioned.role_arn);
    Ok(())
}
