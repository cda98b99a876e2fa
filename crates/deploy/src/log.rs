//! Log-only provisioner for local runs without a provisioning API.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use cadence_engine::{ProvisionError, ProvisionOutcome, Provisioner};

/// Records apply/remove calls in the log and reports success. Used when
/// `PROVISIONER_API_URL` is unset so the dispatch loop stays exercisable
/// in local and test environments.
#[derive(Debug, Default)]
pub struct LogProvisioner;

fn synthetic_outcome(action: &str) -> ProvisionOutcome {
    ProvisionOutcome {
        result_id: format!("local-{}", Uuid::new_v4()),
        action: action.to_string(),
        completed_at: Utc::now(),
    }
}

#[async_trait]
impl Provisioner for LogProvisioner {
    async fn apply(
        &self,
        name: &str,
        description: &str,
        config: &Value,
        imports: Option<(&str, &str)>,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        info!(
            deployment = %name,
            description = %description,
            has_import = imports.is_some(),
            config_keys = config.as_object().map(|o| o.len()).unwrap_or(0),
            "local mode: apply logged, nothing provisioned"
        );
        Ok(synthetic_outcome("insert"))
    }

    async fn remove(&self, name: &str) -> Result<ProvisionOutcome, ProvisionError> {
        info!(deployment = %name, "local mode: remove logged, nothing removed");
        Ok(synthetic_outcome("delete"))
    }
}
