//! Cluster provisioning and teardown against the AWS control plane.
//!
//! Creation attaches an S3 read-only IAM role, requests the cluster, waits
//! for it to become available and opens its port. Deletion undoes the same
//! steps in reverse and tolerates resources that are already gone.

pub mod cluster;
pub mod iam;
pub mod network;
pub mod wait;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_redshift::config::Credentials;
use aws_sdk_redshift::error::DisplayErrorContext;
use tracing::{info, warn};

use sparkify_core::config::{AwsSettings, ClusterSettings};
use sparkify_core::ProvisioningError;

use self::cluster::{ClusterDescription, STATUS_AVAILABLE};
use self::wait::{wait_until, WaitPolicy};

/// Master login of the database created with the cluster.
#[derive(Clone)]
pub struct MasterCredentials {
    pub db_name: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for MasterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterCredentials")
            .field("db_name", &self.db_name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What a successful creation hands back to the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedCluster {
    pub endpoint: String,
    pub role_arn: String,
    pub security_group: Option<String>,
}

/// Full error chain of an SDK failure, tagged with the API operation.
pub(crate) fn api_error<E: std::error::Error>(operation: &str, err: &E) -> ProvisioningError {
    ProvisioningError::api(operation, DisplayErrorContext(err).to_string())
}

/// Shared SDK configuration for `region`. Static keys from the config file
/// win over the default provider chain when present.
pub async fn sdk_config(aws: &AwsSettings, region: &str) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let (Some(key), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key.clone(),
            secret.clone(),
            None,
            None,
            "sparkify-config",
        ));
    }
    loader.load().await
}

pub struct Provisioner {
    redshift: aws_sdk_redshift::Client,
    iam: aws_sdk_iam::Client,
    ec2: aws_sdk_ec2::Client,
    settings: ClusterSettings,
    wait: WaitPolicy,
}

impl Provisioner {
    pub fn new(sdk: &SdkConfig, settings: ClusterSettings) -> Self {
        let wait = WaitPolicy::with_deadline(settings.wait_timeout);
        Self {
            redshift: aws_sdk_redshift::Client::new(sdk),
            iam: aws_sdk_iam::Client::new(sdk),
            ec2: aws_sdk_ec2::Client::new(sdk),
            settings,
            wait,
        }
    }

    pub async fn create(
        &self,
        master: &MasterCredentials,
    ) -> Result<ProvisionedCluster, ProvisioningError> {
        let identifier = self.settings.identifier.as_str();
        let role_arn = iam::ensure_role(&self.iam, &self.settings.iam_role_name).await?;
        cluster::create_cluster(&self.redshift, &self.settings, master, &role_arn).await?;

        let redshift = &self.redshift;
        wait_until(&self.wait, identifier, STATUS_AVAILABLE, || async move {
            let description = cluster::describe_cluster(redshift, identifier).await?;
            Ok::<_, ProvisioningError>(description.is_some_and(|c| c.status == STATUS_AVAILABLE))
        })
        .await?;

        let description = self.describe_existing().await?;
        let endpoint = description
            .endpoint
            .clone()
            .ok_or_else(|| ProvisioningError::UnexpectedResponse {
                operation: "DescribeClusters".to_string(),
                message: format!("cluster `{identifier}` is available but has no endpoint"),
            })?;

        let security_group = network::resolve_security_group(&self.ec2, &description).await?;
        match &security_group {
            Some(group) => network::authorize_ingress(&self.ec2, group, self.settings.port).await?,
            None => warn!(cluster = identifier, "No security group found, port left closed"),
        }

        info!(cluster = identifier, %endpoint, %role_arn, "Cluster ready");
        Ok(ProvisionedCluster {
            endpoint,
            role_arn,
            security_group,
        })
    }

    /// Delete the cluster, wait for it to disappear, then remove the role and
    /// the ingress rule.
    pub async fn delete(&self) -> Result<(), ProvisioningError> {
        let identifier = self.settings.identifier.as_str();
        // The security group has to be looked up while the cluster still exists.
        let security_group = match cluster::describe_cluster(&self.redshift, identifier).await? {
            Some(description) => network::resolve_security_group(&self.ec2, &description).await?,
            None => None,
        };

        if cluster::delete_cluster(&self.redshift, identifier).await? {
            let redshift = &self.redshift;
            wait_until(&self.wait, identifier, "deleted", || async move {
                let description = cluster::describe_cluster(redshift, identifier).await?;
                Ok::<_, ProvisioningError>(description.is_none())
            })
            .await?;
        }

        iam::delete_role(&self.iam, &self.settings.iam_role_name).await?;
        if let Some(group) = security_group {
            network::revoke_ingress(&self.ec2, &group, self.settings.port).await?;
        }
        info!(cluster = identifier, "Cluster resources removed");
        Ok(())
    }

    async fn describe_existing(&self) -> Result<ClusterDescription, ProvisioningError> {
        cluster::describe_cluster(&self.redshift, &self.settings.identifier)
            .await?
            .ok_or_else(|| ProvisioningError::UnexpectedResponse {
                operation: "DescribeClusters".to_string(),
                message: format!("cluster `{}` not found", self.settings.identifier),
            })
    }
}
