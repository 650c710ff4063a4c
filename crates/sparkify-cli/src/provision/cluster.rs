use aws_sdk_redshift::types::Cluster;
use aws_sdk_redshift::Client;
use tracing::{info, warn};

use sparkify_core::config::ClusterSettings;
use sparkify_core::ProvisioningError;

use super::{api_error, MasterCredentials};

pub const STATUS_AVAILABLE: &str = "available";

/// What provisioning needs to know about an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescription {
    pub status: String,
    pub endpoint: Option<String>,
    pub vpc_id: Option<String>,
    pub security_group_ids: Vec<String>,
}

impl From<&Cluster> for ClusterDescription {
    fn from(cluster: &Cluster) -> Self {
        Self {
            status: cluster.cluster_status().unwrap_or("unknown").to_string(),
            endpoint: cluster
                .endpoint()
                .and_then(|e| e.address())
                .map(str::to_string),
            vpc_id: cluster.vpc_id().map(str::to_string),
            security_group_ids: cluster
                .vpc_security_groups()
                .iter()
                .filter_map(|g| g.vpc_security_group_id())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Request cluster creation. An identifier that is already taken is logged
/// and the existing cluster is used.
pub async fn create_cluster(
    client: &Client,
    settings: &ClusterSettings,
    master: &MasterCredentials,
    role_arn: &str,
) -> Result<(), ProvisioningError> {
    let mut request = client
        .create_cluster()
        .cluster_identifier(&settings.identifier)
        .cluster_type(&settings.cluster_type)
        .node_type(&settings.node_type)
        .db_name(&master.db_name)
        .master_username(&master.user)
        .master_user_password(&master.password)
        .port(i32::from(settings.port))
        .iam_roles(role_arn);
    // single-node clusters reject an explicit node count
    if settings.cluster_type != "single-node" {
        request = request.number_of_nodes(settings.num_nodes);
    }

    match request.send().await {
        Ok(_) => {
            info!(
                cluster = %settings.identifier,
                node_type = %settings.node_type,
                nodes = settings.num_nodes,
                "Cluster creation requested"
            );
            Ok(())
        }
        Err(e)
            if e
                .as_service_error()
                .is_some_and(|se| se.is_cluster_already_exists_fault()) =>
        {
            warn!(cluster = %settings.identifier, "Cluster already exists, reusing it");
            Ok(())
        }
        Err(e) => Err(api_error("CreateCluster", &e)),
    }
}

/// `None` when no cluster with that identifier exists.
pub async fn describe_cluster(
    client: &Client,
    identifier: &str,
) -> Result<Option<ClusterDescription>, ProvisioningError> {
    match client
        .describe_clusters()
        .cluster_identifier(identifier)
        .send()
        .await
    {
        Ok(output) => Ok(output.clusters().first().map(ClusterDescription::from)),
        Err(e) if e.as_service_error().is_some_and(|se| se.is_cluster_not_found_fault()) => {
            Ok(None)
        }
        Err(e) => Err(api_error("DescribeClusters", &e)),
    }
}

/// Delete without a final snapshot. Returns `false` when there was nothing
/// to delete.
pub async fn delete_cluster(client: &Client, identifier: &str) -> Result<bool, ProvisioningError> {
    match client
        .delete_cluster()
        .cluster_identifier(identifier)
        .skip_final_cluster_snapshot(true)
        .send()
        .await
    {
        Ok(_) => {
            info!(cluster = identifier, "Cluster deletion requested");
            Ok(true)
        }
        Err(e) if e.as_service_error().is_some_and(|se| se.is_cluster_not_found_fault()) => {
            warn!(cluster = identifier, "Cluster does not exist");
            Ok(false)
        }
        Err(e) => Err(api_error("DeleteCluster", &e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_redshift::types::{Endpoint, VpcSecurityGroupMembership};

    #[test]
    fn description_picks_endpoint_and_security_groups() {
        let cluster = Cluster::builder()
            .cluster_identifier("dwhcluster")
            .cluster_status("available")
            .endpoint(
                Endpoint::builder()
                    .address("dwhcluster.abc123.us-west-2.redshift.amazonaws.com")
                    .port(5439)
                    .build(),
            )
            .vpc_id("vpc-0abc")
            .vpc_security_groups(
                VpcSecurityGroupMembership::builder()
                    .vpc_security_group_id("sg-0123")
                    .status("active")
                    .build(),
            )
            .build();
        let description = ClusterDescription::from(&cluster);
        assert_eq!(description.status, STATUS_AVAILABLE);
        assert_eq!(
            description.endpoint.as_deref(),
            Some("dwhcluster.abc123.us-west-2.redshift.amazonaws.com")
        );
        assert_eq!(description.vpc_id.as_deref(), Some("vpc-0abc"));
        assert_eq!(description.security_group_ids, vec!["sg-0123"]);
    }

    #[test]
    fn creating_cluster_has_no_endpoint_yet() {
        let cluster = Cluster::builder().cluster_status("creating").build();
        let description = ClusterDescription::from(&cluster);
        assert_eq!(description.status, "creating");
        assert!(description.endpoint.is_none());
        assert!(description.security_group_ids.is_empty());
    }
}
