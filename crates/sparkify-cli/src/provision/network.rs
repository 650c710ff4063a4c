use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::Filter;
use aws_sdk_ec2::Client;
use tracing::{info, warn};

use sparkify_core::ProvisioningError;

use super::api_error;
use super::cluster::ClusterDescription;

/// Ingress is opened to any source address, as the cluster is reached from
/// wherever the pipeline runs.
pub const ANY_SOURCE: &str = "0.0.0.0/0";

fn service_code<E: ProvideErrorMetadata, R>(err: &SdkError<E, R>) -> Option<&str> {
    err.as_service_error().and_then(|se| se.code())
}

/// The cluster's own security group, or the default group of its VPC.
pub async fn resolve_security_group(
    client: &Client,
    cluster: &ClusterDescription,
) -> Result<Option<String>, ProvisioningError> {
    if let Some(group) = cluster.security_group_ids.first() {
        return Ok(Some(group.clone()));
    }
    let Some(vpc_id) = &cluster.vpc_id else {
        return Ok(None);
    };
    let output = client
        .describe_security_groups()
        .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
        .filters(Filter::builder().name("group-name").values("default").build())
        .send()
        .await
        .map_err(|e| api_error("DescribeSecurityGroups", &e))?;
    Ok(output
        .security_groups()
        .first()
        .and_then(|g| g.group_id())
        .map(str::to_string))
}

pub async fn authorize_ingress(
    client: &Client,
    group_id: &str,
    port: u16,
) -> Result<(), ProvisioningError> {
    let result = client
        .authorize_security_group_ingress()
        .group_id(group_id)
        .ip_protocol("tcp")
        .cidr_ip(ANY_SOURCE)
        .from_port(i32::from(port))
        .to_port(i32::from(port))
        .send()
        .await;
    match result {
        Ok(_) => {
            info!(group_id, port, cidr = ANY_SOURCE, "Opened cluster port");
            Ok(())
        }
        Err(e) if service_code(&e) == Some("InvalidPermission.Duplicate") => {
            warn!(group_id, port, "Ingress rule already present");
            Ok(())
        }
        Err(e) => Err(api_error("AuthorizeSecurityGroupIngress", &e)),
    }
}

pub async fn revoke_ingress(
    client: &Client,
    group_id: &str,
    port: u16,
) -> Result<(), ProvisioningError> {
    let result = client
        .revoke_security_group_ingress()
        .group_id(group_id)
        .ip_protocol("tcp")
        .cidr_ip(ANY_SOURCE)
        .from_port(i32::from(port))
        .to_port(i32::from(port))
        .send()
        .await;
    match result {
        Ok(_) => {
            info!(group_id, port, "Revoked cluster port ingress");
            Ok(())
        }
        Err(e) if service_code(&e) == Some("InvalidPermission.NotFound") => {
            warn!(group_id, port, "Ingress rule already absent");
            Ok(())
        }
        Err(e) => Err(api_error("RevokeSecurityGroupIngress", &e)),
    }
}
