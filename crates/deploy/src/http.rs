//! HTTP provisioner client.
//!
//! Speaks to a deployment-manager-style REST API: deployments are created
//! with a POST carrying the rendered config (and optional import file) and
//! removed with a DELETE on the deployment resource.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use cadence_core::config::ProvisionerConfig;
use cadence_engine::{ProvisionError, ProvisionOutcome, Provisioner};

/// Provisioner backed by a remote provisioning API.
pub struct HttpProvisioner {
    client: reqwest::Client,
    api_url: String,
    project: String,
}

/// Operation resource returned by the API on apply/remove.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    name: String,
    operation_type: Option<String>,
    insert_time: Option<DateTime<Utc>>,
}

/// Render the request body for an apply call. The config travels as a YAML
/// document inside `target.config.content`, matching what the API expects.
pub fn build_apply_body(
    name: &str,
    description: &str,
    config: &Value,
    imports: Option<(&str, &str)>,
) -> Result<Value, ProvisionError> {
    let content = serde_yaml::to_string(config)
        .map_err(|e| ProvisionError::Config(format!("config is not renderable as YAML: {}", e)))?;
    let mut target = json!({ "config": { "content": content } });
    if let Some((import_name, import_content)) = imports {
        target["imports"] = json!([{ "name": import_name, "content": import_content }]);
    }
    Ok(json!({
        "name": name,
        "description": description,
        "target": target,
    }))
}

impl HttpProvisioner {
    /// Build a client from config. Fails when the API URL or project is
    /// missing; callers fall back to [`crate::LogProvisioner`] in that case.
    pub fn new(config: &ProvisionerConfig) -> Result<Self, ProvisionError> {
        let api_url = config
            .api_url
            .clone()
            .ok_or_else(|| ProvisionError::Config("PROVISIONER_API_URL is not set".into()))?;
        let project = config
            .project
            .clone()
            .ok_or_else(|| ProvisionError::Config("PROVISIONER_PROJECT is not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProvisionError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            project,
        })
    }

    fn deployments_url(&self) -> String {
        format!("{}/projects/{}/deployments", self.api_url, self.project)
    }

    async fn read_outcome(
        &self,
        response: reqwest::Response,
        default_action: &str,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProvisionError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let body: OperationResponse = response
            .json()
            .await
            .map_err(|e| ProvisionError::Http(format!("unreadable operation response: {}", e)))?;
        Ok(ProvisionOutcome {
            result_id: body.name,
            action: body.operation_type.unwrap_or_else(|| default_action.to_string()),
            completed_at: body.insert_time.unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn apply(
        &self,
        name: &str,
        description: &str,
        config: &Value,
        imports: Option<(&str, &str)>,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let body = build_apply_body(name, description, config, imports)?;
        debug!(deployment = %name, "sending apply request");

        let response = self
            .client
            .post(self.deployments_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProvisionError::Http(e.to_string()))?;

        // An existing deployment means this is an update, not an insert.
        if response.status() == reqwest::StatusCode::CONFLICT {
            debug!(deployment = %name, "deployment exists, switching to update");
            let response = self
                .client
                .put(format!("{}/{}", self.deployments_url(), name))
                .json(&body)
                .send()
                .await
                .map_err(|e| ProvisionError::Http(e.to_string()))?;
            let outcome = self.read_outcome(response, "update").await?;
            info!(deployment = %name, result_id = %outcome.result_id, "deployment updated");
            return Ok(outcome);
        }

        let outcome = self.read_outcome(response, "insert").await?;
        info!(deployment = %name, result_id = %outcome.result_id, "deployment created");
        Ok(outcome)
    }

    async fn remove(&self, name: &str) -> Result<ProvisionOutcome, ProvisionError> {
        debug!(deployment = %name, "sending remove request");
        let response = self
            .client
            .delete(format!("{}/{}", self.deployments_url(), name))
            .send()
            .await
            .map_err(|e| ProvisionError::Http(e.to_string()))?;
        let outcome = self.read_outcome(response, "delete").await?;
        info!(deployment = %name, result_id = %outcome.result_id, "deployment removed");
        Ok(outcome)
    }
}
