//! Per-deployment dispatch pipeline and batch orchestration.
//!
//! [`DispatchCoordinator`] runs the sequence: load triggers → select the
//! active set → pick the winner → invoke the provisioner → record the
//! outcome. Deployments are evaluated independently; a failure in one
//! pipeline never aborts its siblings.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use cadence_core::model::{Operation, ScheduledDeployment, Trigger, TriggerAction};

use crate::error::EngineError;
use crate::select::{select_active, select_winner};

// ── Repository seam ─────────────────────────────────────────────────

/// Persistence failure. Aborts the affected deployment's pipeline only.
#[derive(Debug, thiserror::Error)]
#[error("repository error: {0}")]
pub struct RepositoryError(pub String);

/// Narrow persistence interface the engine depends on. Implementations
/// must support concurrent reads and per-entity writes.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_deployments(&self) -> Result<Vec<ScheduledDeployment>, RepositoryError>;

    async fn find_deployment(
        &self,
        name: &str,
    ) -> Result<Option<ScheduledDeployment>, RepositoryError>;

    async fn insert_deployment(
        &self,
        deployment: &ScheduledDeployment,
        triggers: &[Trigger],
    ) -> Result<(), RepositoryError>;

    /// Replace the parent record and its trigger set atomically: old
    /// triggers are gone before new ones are visible.
    async fn update_deployment(
        &self,
        deployment: &ScheduledDeployment,
        triggers: &[Trigger],
    ) -> Result<(), RepositoryError>;

    /// Delete the deployment together with its triggers and operations.
    async fn delete_deployment(&self, deployment_id: Uuid) -> Result<(), RepositoryError>;

    async fn list_triggers(&self, deployment_id: Uuid) -> Result<Vec<Trigger>, RepositoryError>;

    async fn update_last_dispatched(
        &self,
        deployment_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn insert_operation(
        &self,
        deployment_id: Uuid,
        operation: &Operation,
    ) -> Result<(), RepositoryError>;

    async fn list_operations(&self, deployment_id: Uuid) -> Result<Vec<Operation>, RepositoryError>;
}

// ── Provisioner seam ────────────────────────────────────────────────

/// Failure of an external apply/remove call. Recorded as a failed
/// [`Operation`]; the engine does not retry — the next pass recovers via
/// the missed-window rule.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("provisioning request failed: {0}")]
    Http(String),

    #[error("provisioning API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provisioner configuration error: {0}")]
    Config(String),
}

/// Result metadata of a successful apply/remove call.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    /// The provisioning API's own operation identifier.
    pub result_id: String,
    /// Action the API reported (e.g. `insert`, `delete`).
    pub action: String,
    pub completed_at: DateTime<Utc>,
}

/// External infrastructure-provisioning API. A possibly-slow remote call
/// with its own retry policy; implementations should bound it with a
/// timeout.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn apply(
        &self,
        name: &str,
        description: &str,
        config: &serde_json::Value,
        imports: Option<(&str, &str)>,
    ) -> Result<ProvisionOutcome, ProvisionError>;

    async fn remove(&self, name: &str) -> Result<ProvisionOutcome, ProvisionError>;
}

// ── Coordinator ─────────────────────────────────────────────────────

/// Outcome of one deployment's evaluation pass.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// No trigger inside the dispatch window; no operation recorded.
    Skipped,
    /// The winner's side effect succeeded.
    Dispatched(Operation),
    /// The winner's side effect failed; `last_dispatched_at` untouched so
    /// the next pass retries via recovery.
    Failed(Operation),
}

/// Counts for one whole batch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub evaluated: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Pipelines that errored before reaching the provisioner (validation,
    /// schedule parse, persistence).
    pub errored: usize,
}

/// Orchestrates trigger evaluation and dispatch for scheduled deployments.
///
/// Constructed once with injected collaborators and reused across passes.
pub struct DispatchCoordinator {
    repo: Arc<dyn Repository>,
    provisioner: Arc<dyn Provisioner>,
    interval_minutes: u32,
    name_prefix: String,
}

impl DispatchCoordinator {
    pub fn new(
        repo: Arc<dyn Repository>,
        provisioner: Arc<dyn Provisioner>,
        interval_minutes: u32,
        name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            provisioner,
            interval_minutes,
            name_prefix: name_prefix.into(),
        }
    }

    /// Evaluate every scheduled deployment once, one task per deployment.
    ///
    /// Only a failure to enumerate the deployments aborts the pass;
    /// per-deployment errors are logged and counted.
    pub async fn dispatch_all(self: &Arc<Self>, now: DateTime<Utc>) -> Result<BatchSummary, EngineError> {
        let deployments = self.repo.list_deployments().await?;
        if deployments.is_empty() {
            info!("no scheduled deployments to evaluate");
            return Ok(BatchSummary::default());
        }

        let mut handles = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            let coordinator = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let name = deployment.name.clone();
                (name, coordinator.dispatch(&deployment, now).await)
            }));
        }

        let mut summary = BatchSummary::default();
        for handle in handles {
            match handle.await {
                Ok((name, result)) => {
                    summary.evaluated += 1;
                    match result {
                        Ok(DispatchOutcome::Skipped) => summary.skipped += 1,
                        Ok(DispatchOutcome::Dispatched(_)) => summary.dispatched += 1,
                        Ok(DispatchOutcome::Failed(_)) => summary.failed += 1,
                        Err(e) => {
                            summary.errored += 1;
                            warn!(deployment = %name, error = %e, "evaluation pass failed for deployment");
                        }
                    }
                }
                Err(e) => {
                    summary.errored += 1;
                    warn!(error = %e, "deployment evaluation task panicked");
                }
            }
        }

        info!(
            evaluated = summary.evaluated,
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            failed = summary.failed,
            errored = summary.errored,
            "dispatch pass complete"
        );
        Ok(summary)
    }

    /// Run one deployment's pipeline: load triggers, select, dispatch,
    /// record.
    pub async fn dispatch(
        &self,
        deployment: &ScheduledDeployment,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, EngineError> {
        let last_dispatched = deployment
            .last_dispatched_at
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let triggers = self.repo.list_triggers(deployment.id).await?;
        let active = select_active(&triggers, now, self.interval_minutes, last_dispatched)?;

        let Some(winner) = select_winner(&active) else {
            return Ok(DispatchOutcome::Skipped);
        };

        info!(
            deployment = %deployment.name,
            trigger = %winner.trigger.name,
            action = %winner.trigger.action,
            occurrence = %winner.timestamp,
            "dispatching winning trigger"
        );

        let target = format!("{}{}", self.name_prefix, deployment.name);
        let result = match winner.trigger.action {
            TriggerAction::CreateOrUpdate => {
                let Some(config) = winner.trigger.config.as_ref() else {
                    // Structurally valid but undeployable; record the
                    // failure instead of calling the API.
                    let operation = Operation::failure(
                        &deployment.name,
                        format!("trigger '{}' has no config to apply", winner.trigger.name),
                        now,
                    );
                    self.repo.insert_operation(deployment.id, &operation).await?;
                    return Ok(DispatchOutcome::Failed(operation));
                };
                let imports = winner
                    .trigger
                    .import_name
                    .as_deref()
                    .zip(winner.trigger.import_content.as_deref());
                let description = winner.trigger.description.as_deref().unwrap_or_default();
                self.provisioner
                    .apply(&target, description, config, imports)
                    .await
            }
            TriggerAction::Delete => self.provisioner.remove(&target).await,
        };

        match result {
            Ok(outcome) => {
                let operation = Operation::success(
                    &deployment.name,
                    outcome.result_id,
                    outcome.action,
                    outcome.completed_at,
                );
                self.repo.insert_operation(deployment.id, &operation).await?;
                self.repo
                    .update_last_dispatched(deployment.id, outcome.completed_at)
                    .await?;
                Ok(DispatchOutcome::Dispatched(operation))
            }
            Err(e) => {
                warn!(deployment = %deployment.name, error = %e, "provisioning call failed");
                let operation = Operation::failure(&deployment.name, e.to_string(), Utc::now());
                self.repo.insert_operation(deployment.id, &operation).await?;
                Ok(DispatchOutcome::Failed(operation))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::TimeZone;

    use cadence_core::model::TriggerSpec;

    use super::*;

    // -- in-memory fakes ---------------------------------------------------

    #[derive(Default)]
    struct FakeRepo {
        deployments: Mutex<Vec<ScheduledDeployment>>,
        triggers: Mutex<HashMap<Uuid, Vec<Trigger>>>,
        operations: Mutex<HashMap<Uuid, Vec<Operation>>>,
        fail_list_triggers_for: Mutex<Option<Uuid>>,
    }

    #[async_trait]
    impl Repository for FakeRepo {
        async fn list_deployments(&self) -> Result<Vec<ScheduledDeployment>, RepositoryError> {
            Ok(self.deployments.lock().unwrap().clone())
        }

        async fn find_deployment(
            &self,
            name: &str,
        ) -> Result<Option<ScheduledDeployment>, RepositoryError> {
            Ok(self
                .deployments
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.name == name)
                .cloned())
        }

        async fn insert_deployment(
            &self,
            deployment: &ScheduledDeployment,
            triggers: &[Trigger],
        ) -> Result<(), RepositoryError> {
            self.deployments.lock().unwrap().push(deployment.clone());
            self.triggers
                .lock()
                .unwrap()
                .insert(deployment.id, triggers.to_vec());
            Ok(())
        }

        async fn update_deployment(
            &self,
            deployment: &ScheduledDeployment,
            triggers: &[Trigger],
        ) -> Result<(), RepositoryError> {
            self.triggers
                .lock()
                .unwrap()
                .insert(deployment.id, triggers.to_vec());
            Ok(())
        }

        async fn delete_deployment(&self, deployment_id: Uuid) -> Result<(), RepositoryError> {
            self.deployments
                .lock()
                .unwrap()
                .retain(|d| d.id != deployment_id);
            Ok(())
        }

        async fn list_triggers(&self, deployment_id: Uuid) -> Result<Vec<Trigger>, RepositoryError> {
            if *self.fail_list_triggers_for.lock().unwrap() == Some(deployment_id) {
                return Err(RepositoryError("simulated outage".into()));
            }
            Ok(self
                .triggers
                .lock()
                .unwrap()
                .get(&deployment_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn update_last_dispatched(
            &self,
            deployment_id: Uuid,
            at: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            let mut deployments = self.deployments.lock().unwrap();
            if let Some(d) = deployments.iter_mut().find(|d| d.id == deployment_id) {
                d.last_dispatched_at = Some(at);
            }
            Ok(())
        }

        async fn insert_operation(
            &self,
            deployment_id: Uuid,
            operation: &Operation,
        ) -> Result<(), RepositoryError> {
            self.operations
                .lock()
                .unwrap()
                .entry(deployment_id)
                .or_default()
                .push(operation.clone());
            Ok(())
        }

        async fn list_operations(
            &self,
            deployment_id: Uuid,
        ) -> Result<Vec<Operation>, RepositoryError> {
            Ok(self
                .operations
                .lock()
                .unwrap()
                .get(&deployment_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeProvisioner {
        applies: Mutex<Vec<String>>,
        removes: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn apply(
            &self,
            name: &str,
            _description: &str,
            _config: &serde_json::Value,
            _imports: Option<(&str, &str)>,
        ) -> Result<ProvisionOutcome, ProvisionError> {
            if self.fail {
                return Err(ProvisionError::Api {
                    status: 503,
                    message: "backend unavailable".into(),
                });
            }
            self.applies.lock().unwrap().push(name.to_string());
            Ok(ProvisionOutcome {
                result_id: "op-1".into(),
                action: "insert".into(),
                completed_at: Utc::now(),
            })
        }

        async fn remove(&self, name: &str) -> Result<ProvisionOutcome, ProvisionError> {
            if self.fail {
                return Err(ProvisionError::Api {
                    status: 503,
                    message: "backend unavailable".into(),
                });
            }
            self.removes.lock().unwrap().push(name.to_string());
            Ok(ProvisionOutcome {
                result_id: "op-2".into(),
                action: "delete".into(),
                completed_at: Utc::now(),
            })
        }
    }

    // -- helpers ----------------------------------------------------------

    fn at(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 8, 10, h, mi, s).unwrap()
    }

    fn trigger(name: &str, time: &str, action: &str, with_config: bool) -> Trigger {
        TriggerSpec {
            name: Some(name.into()),
            kind: Some("timer".into()),
            time: Some(time.into()),
            action: Some(action.into()),
            config: with_config.then(|| serde_json::json!({"resources": []})),
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    async fn seed(
        repo: &FakeRepo,
        name: &str,
        last_dispatched: Option<DateTime<Utc>>,
        triggers: Vec<Trigger>,
    ) -> ScheduledDeployment {
        let mut deployment = ScheduledDeployment::new(name, "test deployment", "lily");
        deployment.last_dispatched_at = last_dispatched;
        repo.insert_deployment(&deployment, &triggers).await.unwrap();
        deployment
    }

    fn coordinator(repo: Arc<FakeRepo>, prov: Arc<FakeProvisioner>) -> Arc<DispatchCoordinator> {
        Arc::new(DispatchCoordinator::new(repo, prov, 10, ""))
    }

    // -- dispatch ----------------------------------------------------------

    #[tokio::test]
    async fn skips_when_no_trigger_is_active() {
        let repo = Arc::new(FakeRepo::default());
        let prov = Arc::new(FakeProvisioner::default());
        let deployment = seed(
            &repo,
            "quiet",
            Some(at(0, 25, 0)),
            vec![trigger("t", "20 0 * * *", "CREATE_OR_UPDATE", true)],
        )
        .await;

        let outcome = coordinator(repo.clone(), prov.clone())
            .dispatch(&deployment, at(0, 30, 0))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Skipped));
        assert!(repo.list_operations(deployment.id).await.unwrap().is_empty());
        assert!(prov.applies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_winner_invokes_remove_not_apply() {
        let repo = Arc::new(FakeRepo::default());
        let prov = Arc::new(FakeProvisioner::default());
        let deployment = seed(
            &repo,
            "contested",
            Some(at(0, 20, 0)),
            vec![
                trigger("create-trigger", "33 0 * * *", "CREATE_OR_UPDATE", true),
                trigger("delete-trigger", "34 0 * * *", "DELETE", false),
            ],
        )
        .await;

        let outcome = coordinator(repo.clone(), prov.clone())
            .dispatch(&deployment, at(0, 30, 0))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dispatched(_)));
        assert!(prov.applies.lock().unwrap().is_empty());
        assert_eq!(*prov.removes.lock().unwrap(), vec!["contested".to_string()]);

        let stored = repo.find_deployment("contested").await.unwrap().unwrap();
        assert!(stored.last_dispatched_at.unwrap() > at(0, 20, 0));
        let ops = repo.list_operations(deployment.id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert!(ops[0].succeeded());
    }

    #[tokio::test]
    async fn create_winner_invokes_apply_with_prefix() {
        let repo = Arc::new(FakeRepo::default());
        let prov = Arc::new(FakeProvisioner::default());
        let deployment = seed(
            &repo,
            "web-tier",
            None,
            vec![trigger("apply", "* * * * *", "CREATE_OR_UPDATE", true)],
        )
        .await;

        let coordinator = Arc::new(DispatchCoordinator::new(repo.clone(), prov.clone(), 10, "sd-"));
        let outcome = coordinator.dispatch(&deployment, at(0, 30, 0)).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dispatched(_)));
        assert_eq!(*prov.applies.lock().unwrap(), vec!["sd-web-tier".to_string()]);
    }

    #[tokio::test]
    async fn provisioner_failure_leaves_last_dispatched_stale() {
        let repo = Arc::new(FakeRepo::default());
        let prov = Arc::new(FakeProvisioner {
            fail: true,
            ..Default::default()
        });
        let last = at(0, 0, 0);
        let deployment = seed(
            &repo,
            "flaky",
            Some(last),
            vec![trigger("apply", "* * * * *", "CREATE_OR_UPDATE", true)],
        )
        .await;

        let outcome = coordinator(repo.clone(), prov)
            .dispatch(&deployment, at(0, 30, 0))
            .await
            .unwrap();
        let DispatchOutcome::Failed(operation) = outcome else {
            panic!("expected failed dispatch");
        };
        assert!(!operation.succeeded());

        // last_dispatched unchanged: the next pass recovers this occurrence.
        let stored = repo.find_deployment("flaky").await.unwrap().unwrap();
        assert_eq!(stored.last_dispatched_at, Some(last));
        assert_eq!(repo.list_operations(deployment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_without_config_records_failure_without_calling_api() {
        let repo = Arc::new(FakeRepo::default());
        let prov = Arc::new(FakeProvisioner::default());
        let deployment = seed(
            &repo,
            "misconfigured",
            None,
            vec![trigger("apply", "* * * * *", "CREATE_OR_UPDATE", false)],
        )
        .await;

        let outcome = coordinator(repo.clone(), prov.clone())
            .dispatch(&deployment, at(0, 30, 0))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
        assert!(prov.applies.lock().unwrap().is_empty());
        assert_eq!(repo.list_operations(deployment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_trigger_errors_the_pipeline() {
        let repo = Arc::new(FakeRepo::default());
        let prov = Arc::new(FakeProvisioner::default());
        let mut bad = trigger("broken", "* * * * *", "DELETE", false);
        bad.time = String::new();
        let deployment = seed(&repo, "invalid", None, vec![bad]).await;

        let err = coordinator(repo, prov)
            .dispatch(&deployment, at(0, 30, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    // -- dispatch_all ------------------------------------------------------

    #[tokio::test]
    async fn batch_isolates_failing_deployments() {
        let repo = Arc::new(FakeRepo::default());
        let prov = Arc::new(FakeProvisioner::default());

        seed(
            &repo,
            "healthy",
            None,
            vec![trigger("apply", "* * * * *", "CREATE_OR_UPDATE", true)],
        )
        .await;
        let mut bad = trigger("broken", "* * * * *", "DELETE", false);
        bad.time = String::new();
        seed(&repo, "broken-deployment", None, vec![bad]).await;
        let outage = seed(
            &repo,
            "db-down",
            None,
            vec![trigger("apply", "* * * * *", "DELETE", false)],
        )
        .await;
        *repo.fail_list_triggers_for.lock().unwrap() = Some(outage.id);

        let summary = coordinator(repo.clone(), prov.clone())
            .dispatch_all(at(0, 30, 0))
            .await
            .unwrap();
        assert_eq!(summary.evaluated, 3);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.errored, 2);
        // The healthy sibling still dispatched.
        assert_eq!(*prov.applies.lock().unwrap(), vec!["healthy".to_string()]);
    }

    #[tokio::test]
    async fn empty_repository_is_a_clean_pass() {
        let repo = Arc::new(FakeRepo::default());
        let prov = Arc::new(FakeProvisioner::default());
        let summary = coordinator(repo, prov)
            .dispatch_all(at(0, 30, 0))
            .await
            .unwrap();
        assert_eq!(summary, BatchSummary::default());
    }
}
