//! In-memory repository backend.
//!
//! Keeps everything in a `std::sync::RwLock`-guarded map keyed by
//! deployment id. State is lost on restart; intended for tests and local
//! runs where Postgres is not configured.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use cadence_core::model::{Operation, ScheduledDeployment, Trigger};
use cadence_engine::{Repository, RepositoryError};

#[derive(Debug)]
struct DeploymentRecord {
    deployment: ScheduledDeployment,
    triggers: Vec<Trigger>,
    operations: Vec<Operation>,
}

/// Volatile repository keyed by deployment id.
#[derive(Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<Uuid, DeploymentRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_deployments(&self) -> Result<Vec<ScheduledDeployment>, RepositoryError> {
        let records = self.records.read().expect("memory repository lock poisoned");
        let mut deployments: Vec<_> = records.values().map(|r| r.deployment.clone()).collect();
        deployments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(deployments)
    }

    async fn find_deployment(
        &self,
        name: &str,
    ) -> Result<Option<ScheduledDeployment>, RepositoryError> {
        let records = self.records.read().expect("memory repository lock poisoned");
        Ok(records
            .values()
            .find(|r| r.deployment.name == name)
            .map(|r| r.deployment.clone()))
    }

    async fn insert_deployment(
        &self,
        deployment: &ScheduledDeployment,
        triggers: &[Trigger],
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().expect("memory repository lock poisoned");
        if records.values().any(|r| r.deployment.name == deployment.name) {
            return Err(RepositoryError(format!(
                "a scheduled deployment already exists with the name '{}'",
                deployment.name
            )));
        }
        records.insert(
            deployment.id,
            DeploymentRecord {
                deployment: deployment.clone(),
                triggers: triggers.to_vec(),
                operations: Vec::new(),
            },
        );
        Ok(())
    }

    async fn update_deployment(
        &self,
        deployment: &ScheduledDeployment,
        triggers: &[Trigger],
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().expect("memory repository lock poisoned");
        let record = records
            .get_mut(&deployment.id)
            .ok_or_else(|| RepositoryError(format!("no deployment with id {}", deployment.id)))?;
        record.deployment = deployment.clone();
        record.triggers = triggers.to_vec();
        Ok(())
    }

    async fn delete_deployment(&self, deployment_id: Uuid) -> Result<(), RepositoryError> {
        let mut records = self.records.write().expect("memory repository lock poisoned");
        records.remove(&deployment_id);
        Ok(())
    }

    async fn list_triggers(&self, deployment_id: Uuid) -> Result<Vec<Trigger>, RepositoryError> {
        let records = self.records.read().expect("memory repository lock poisoned");
        Ok(records
            .get(&deployment_id)
            .map(|r| r.triggers.clone())
            .unwrap_or_default())
    }

    async fn update_last_dispatched(
        &self,
        deployment_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().expect("memory repository lock poisoned");
        let record = records
            .get_mut(&deployment_id)
            .ok_or_else(|| RepositoryError(format!("no deployment with id {}", deployment_id)))?;
        record.deployment.last_dispatched_at = Some(at);
        Ok(())
    }

    async fn insert_operation(
        &self,
        deployment_id: Uuid,
        operation: &Operation,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().expect("memory repository lock poisoned");
        let record = records
            .get_mut(&deployment_id)
            .ok_or_else(|| RepositoryError(format!("no deployment with id {}", deployment_id)))?;
        record.operations.push(operation.clone());
        Ok(())
    }

    async fn list_operations(&self, deployment_id: Uuid) -> Result<Vec<Operation>, RepositoryError> {
        let records = self.records.read().expect("memory repository lock poisoned");
        Ok(records
            .get(&deployment_id)
            .map(|r| r.operations.clone())
            .unwrap_or_default())
    }
}
