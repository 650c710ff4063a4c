use aws_sdk_iam::Client;
use serde_json::json;
use tracing::{info, warn};

use sparkify_core::ProvisioningError;

use super::api_error;

/// Managed policy that lets the cluster read the staging buckets.
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Trust policy allowing Redshift to assume the role.
pub fn trust_policy() -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": "redshift.amazonaws.com" }
        }]
    })
    .to_string()
}

/// Create the role (or reuse an existing one), attach S3 read access and
/// return its ARN.
pub async fn ensure_role(client: &Client, role_name: &str) -> Result<String, ProvisioningError> {
    match client
        .create_role()
        .path("/")
        .role_name(role_name)
        .description("Allows Redshift clusters to read the Sparkify staging buckets")
        .assume_role_policy_document(trust_policy())
        .send()
        .await
    {
        Ok(_) => info!(role = role_name, "Created IAM role"),
        Err(e)
            if e
                .as_service_error()
                .is_some_and(|se| se.is_entity_already_exists_exception()) =>
        {
            warn!(role = role_name, "IAM role already exists, reusing it");
        }
        Err(e) => return Err(api_error("CreateRole", &e)),
    }

    client
        .attach_role_policy()
        .role_name(role_name)
        .policy_arn(S3_READ_ONLY_POLICY_ARN)
        .send()
        .await
        .map_err(|e| api_error("AttachRolePolicy", &e))?;

    let arn = role_arn(client, role_name).await?;
    info!(role = role_name, %arn, "IAM role ready");
    Ok(arn)
}

pub async fn role_arn(client: &Client, role_name: &str) -> Result<String, ProvisioningError> {
    let output = client
        .get_role()
        .role_name(role_name)
        .send()
        .await
        .map_err(|e| api_error("GetRole", &e))?;
    output
        .role()
        .map(|role| role.arn().to_string())
        .ok_or_else(|| ProvisioningError::UnexpectedResponse {
            operation: "GetRole".to_string(),
            message: format!("no role `{role_name}` in response"),
        })
}

/// Detach the S3 policy and delete the role. A role that is already gone is
/// only logged.
pub async fn delete_role(client: &Client, role_name: &str) -> Result<(), ProvisioningError> {
    match client
        .detach_role_policy()
        .role_name(role_name)
        .policy_arn(S3_READ_ONLY_POLICY_ARN)
        .send()
        .await
    {
        Ok(_) => {}
        Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_entity_exception()) => {
            warn!(role = role_name, "Policy already detached or role missing");
        }
        Err(e) => return Err(api_error("DetachRolePolicy", &e)),
    }

    match client.delete_role().role_name(role_name).send().await {
        Ok(_) => info!(role = role_name, "Deleted IAM role"),
        Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_entity_exception()) => {
            warn!(role = role_name, "IAM role does not exist");
        }
        Err(e) => return Err(api_error("DeleteRole", &e)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_policy_lets_redshift_assume_the_role() {
        let doc: serde_json::Value = serde_json::from_str(&trust_policy()).expect("json");
        let statement = &doc["Statement"][0];
        assert_eq!(statement["Action"], "sts:AssumeRole");
        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(statement["Principal"]["Service"], "redshift.amazonaws.com");
        assert_eq!(doc["Version"], "2012-10-17");
    }
}
