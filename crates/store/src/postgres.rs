//! sqlx/Postgres repository backend.
//!
//! Three tables: `scheduled_deployments`, `triggers`, `operations`.
//! Trigger config payloads are stored as JSON text; operation outcomes are
//! flattened into success/failure columns and rebuilt on read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use cadence_core::config::PostgresConfig;
use cadence_core::model::{Operation, OperationOutcome, ScheduledDeployment, Trigger};
use cadence_engine::{Repository, RepositoryError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scheduled_deployments (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    owner TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    last_dispatched_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS triggers (
    id UUID PRIMARY KEY,
    deployment_id UUID NOT NULL REFERENCES scheduled_deployments(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    time TEXT NOT NULL,
    action TEXT NOT NULL,
    description TEXT,
    config TEXT,
    import_name TEXT,
    import_content TEXT,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS operations (
    id UUID PRIMARY KEY,
    deployment_id UUID NOT NULL REFERENCES scheduled_deployments(id) ON DELETE CASCADE,
    target TEXT NOT NULL,
    success BOOLEAN NOT NULL,
    result_id TEXT,
    action TEXT,
    completed_at TIMESTAMPTZ,
    message TEXT,
    failed_at TIMESTAMPTZ,
    recorded_at TIMESTAMPTZ NOT NULL
);
"#;

fn db_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError(e.to_string())
}

/// Postgres-backed repository.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Connect and ensure the schema exists.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.url())
            .await
            .map_err(db_err)?;

        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await.map_err(db_err)?;
        }
        info!(host = %config.host, database = %config.database, "connected to Postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ── Row types ───────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    name: String,
    description: String,
    owner: String,
    created_at: DateTime<Utc>,
    last_dispatched_at: Option<DateTime<Utc>>,
}

impl From<DeploymentRow> for ScheduledDeployment {
    fn from(row: DeploymentRow) -> Self {
        ScheduledDeployment {
            id: row.id,
            name: row.name,
            description: row.description,
            user: row.owner,
            created_at: row.created_at,
            last_dispatched_at: row.last_dispatched_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TriggerRow {
    id: Uuid,
    name: String,
    kind: String,
    time: String,
    action: String,
    description: Option<String>,
    config: Option<String>,
    import_name: Option<String>,
    import_content: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TriggerRow> for Trigger {
    type Error = RepositoryError;

    fn try_from(row: TriggerRow) -> Result<Self, RepositoryError> {
        let action = row
            .action
            .parse()
            .map_err(|_| RepositoryError(format!("trigger {} has corrupt action '{}'", row.id, row.action)))?;
        let config = row
            .config
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError(format!("trigger {} has corrupt config: {}", row.id, e)))?;
        Ok(Trigger {
            id: row.id,
            name: row.name,
            kind: row.kind,
            time: row.time,
            action,
            description: row.description,
            config,
            import_name: row.import_name,
            import_content: row.import_content,
            created_at: row.created_at,
        })
    }
}

fn operation_from_row(row: &sqlx::postgres::PgRow) -> Result<Operation, RepositoryError> {
    let id: Uuid = row.try_get("id").map_err(db_err)?;
    let success: bool = row.try_get("success").map_err(db_err)?;
    let outcome = if success {
        OperationOutcome::Success {
            result_id: row.try_get("result_id").map_err(db_err)?,
            action: row.try_get("action").map_err(db_err)?,
            completed_at: row.try_get("completed_at").map_err(db_err)?,
        }
    } else {
        OperationOutcome::Failure {
            message: row.try_get("message").map_err(db_err)?,
            failed_at: row.try_get("failed_at").map_err(db_err)?,
        }
    };
    Ok(Operation {
        id,
        target: row.try_get("target").map_err(db_err)?,
        outcome,
        recorded_at: row.try_get("recorded_at").map_err(db_err)?,
    })
}

async fn insert_trigger_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    deployment_id: Uuid,
    trigger: &Trigger,
) -> Result<(), RepositoryError> {
    let config_text = trigger
        .config
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError(format!("unserializable trigger config: {}", e)))?;
    sqlx::query(
        r#"INSERT INTO triggers
               (id, deployment_id, name, kind, time, action, description,
                config, import_name, import_content, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
    )
    .bind(trigger.id)
    .bind(deployment_id)
    .bind(&trigger.name)
    .bind(&trigger.kind)
    .bind(&trigger.time)
    .bind(trigger.action.as_str())
    .bind(&trigger.description)
    .bind(config_text)
    .bind(&trigger.import_name)
    .bind(&trigger.import_content)
    .bind(trigger.created_at)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

// ── Repository impl ─────────────────────────────────────────────────

#[async_trait]
impl Repository for PgRepository {
    async fn list_deployments(&self) -> Result<Vec<ScheduledDeployment>, RepositoryError> {
        let rows = sqlx::query_as::<_, DeploymentRow>(
            r#"SELECT id, name, description, owner, created_at, last_dispatched_at
               FROM scheduled_deployments ORDER BY created_at"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(ScheduledDeployment::from).collect())
    }

    async fn find_deployment(
        &self,
        name: &str,
    ) -> Result<Option<ScheduledDeployment>, RepositoryError> {
        let row = sqlx::query_as::<_, DeploymentRow>(
            r#"SELECT id, name, description, owner, created_at, last_dispatched_at
               FROM scheduled_deployments WHERE name = $1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(ScheduledDeployment::from))
    }

    async fn insert_deployment(
        &self,
        deployment: &ScheduledDeployment,
        triggers: &[Trigger],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"INSERT INTO scheduled_deployments
                   (id, name, description, owner, created_at, last_dispatched_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(deployment.id)
        .bind(&deployment.name)
        .bind(&deployment.description)
        .bind(&deployment.user)
        .bind(deployment.created_at)
        .bind(deployment.last_dispatched_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for trigger in triggers {
            insert_trigger_tx(&mut tx, deployment.id, trigger).await?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn update_deployment(
        &self,
        deployment: &ScheduledDeployment,
        triggers: &[Trigger],
    ) -> Result<(), RepositoryError> {
        // Old triggers must be gone before new ones are visible; one
        // transaction keeps a concurrent dispatch pass from seeing both.
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM triggers WHERE deployment_id = $1")
            .bind(deployment.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query(
            r#"UPDATE scheduled_deployments
               SET description = $2, owner = $3
               WHERE id = $1"#,
        )
        .bind(deployment.id)
        .bind(&deployment.description)
        .bind(&deployment.user)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for trigger in triggers {
            insert_trigger_tx(&mut tx, deployment.id, trigger).await?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn delete_deployment(&self, deployment_id: Uuid) -> Result<(), RepositoryError> {
        // Triggers and operations cascade.
        sqlx::query("DELETE FROM scheduled_deployments WHERE id = $1")
            .bind(deployment_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_triggers(&self, deployment_id: Uuid) -> Result<Vec<Trigger>, RepositoryError> {
        let rows = sqlx::query_as::<_, TriggerRow>(
            r#"SELECT id, name, kind, time, action, description,
                      config, import_name, import_content, created_at
               FROM triggers WHERE deployment_id = $1 ORDER BY created_at, name"#,
        )
        .bind(deployment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Trigger::try_from).collect()
    }

    async fn update_last_dispatched(
        &self,
        deployment_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE scheduled_deployments SET last_dispatched_at = $2 WHERE id = $1")
            .bind(deployment_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_operation(
        &self,
        deployment_id: Uuid,
        operation: &Operation,
    ) -> Result<(), RepositoryError> {
        let (success, result_id, action, completed_at, message, failed_at) = match &operation.outcome
        {
            OperationOutcome::Success {
                result_id,
                action,
                completed_at,
            } => (true, Some(result_id), Some(action), Some(*completed_at), None, None),
            OperationOutcome::Failure { message, failed_at } => {
                (false, None, None, None, Some(message), Some(*failed_at))
            }
        };
        sqlx::query(
            r#"INSERT INTO operations
                   (id, deployment_id, target, success, result_id, action,
                    completed_at, message, failed_at, recorded_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(operation.id)
        .bind(deployment_id)
        .bind(&operation.target)
        .bind(success)
        .bind(result_id)
        .bind(action)
        .bind(completed_at)
        .bind(message)
        .bind(failed_at)
        .bind(operation.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_operations(&self, deployment_id: Uuid) -> Result<Vec<Operation>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT id, target, success, result_id, action,
                      completed_at, message, failed_at, recorded_at
               FROM operations WHERE deployment_id = $1 ORDER BY recorded_at DESC"#,
        )
        .bind(deployment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(operation_from_row).collect()
    }
}
