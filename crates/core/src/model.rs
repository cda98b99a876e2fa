//! Persisted data model for scheduled deployments.
//!
//! A [`ScheduledDeployment`] owns a set of [`Trigger`]s (cron schedules with
//! an apply-or-delete action) and accumulates [`Operation`] audit records,
//! one per dispatch attempt. [`TriggerSpec`] is the untyped intake form a
//! trigger arrives in; it becomes a [`Trigger`] only after validation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Actions ───────────────────────────────────────────────────

/// What a firing trigger does to the target deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerAction {
    /// Apply the trigger's configuration (create the deployment or
    /// update it in place).
    CreateOrUpdate,
    /// Tear the deployment down.
    Delete,
}

impl TriggerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerAction::CreateOrUpdate => "CREATE_OR_UPDATE",
            TriggerAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE_OR_UPDATE" => Ok(TriggerAction::CreateOrUpdate),
            "DELETE" => Ok(TriggerAction::Delete),
            _ => Err(()),
        }
    }
}

// ── Scheduled deployment ──────────────────────────────────────

/// A named, user-owned record representing an infrastructure configuration
/// that is periodically (re)applied or torn down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledDeployment {
    pub id: Uuid,
    /// Unique, immutable after creation.
    pub name: String,
    pub description: String,
    /// Owner of the record (the original intake field is `user`).
    pub user: String,
    pub created_at: DateTime<Utc>,
    /// Set only after a successful provisioning call; drives the
    /// missed-window recovery rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_dispatched_at: Option<DateTime<Utc>>,
}

impl ScheduledDeployment {
    pub fn new(name: impl Into<String>, description: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            user: user.into(),
            created_at: Utc::now(),
            last_dispatched_at: None,
        }
    }
}

// ── Triggers ──────────────────────────────────────────────────

/// A validated trigger attached to one scheduled deployment.
///
/// Immutable once loaded for an evaluation pass; replaced wholesale when
/// the parent deployment is updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Uuid,
    pub name: String,
    /// Free-form descriptor (the intake field is `type`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Five-field crontab schedule.
    pub time: String,
    pub action: TriggerAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque deployment payload; expected for CREATE_OR_UPDATE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// Template import pair: both present or both absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw intake form of a trigger, before validation.
///
/// Every field is optional so a malformed payload deserializes cleanly and
/// the validator can report all missing fields in one response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub time: Option<String>,
    pub action: Option<String>,
    pub description: Option<String>,
    pub config: Option<serde_json::Value>,
    pub import_name: Option<String>,
    pub import_content: Option<String>,
}

/// Borrowed view of the fields trigger validation inspects. Produced from
/// both the intake form and the persisted form so one validator serves the
/// intake surface and the pre-dispatch check.
#[derive(Debug, Clone, Copy)]
pub struct TriggerFields<'a> {
    pub name: Option<&'a str>,
    pub kind: Option<&'a str>,
    pub time: Option<&'a str>,
    pub action: Option<&'a str>,
    pub import_name: Option<&'a str>,
    pub import_content: Option<&'a str>,
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl TriggerSpec {
    pub fn fields(&self) -> TriggerFields<'_> {
        TriggerFields {
            name: self.name.as_deref().and_then(non_empty),
            kind: self.kind.as_deref().and_then(non_empty),
            time: self.time.as_deref().and_then(non_empty),
            action: self.action.as_deref().and_then(non_empty),
            import_name: self.import_name.as_deref(),
            import_content: self.import_content.as_deref(),
        }
    }

    /// Convert a spec into a persistable trigger. Intended for specs the
    /// validator has already accepted; reports the first incomplete field
    /// otherwise.
    pub fn build(self) -> Result<Trigger, IncompleteTrigger> {
        let action = self
            .action
            .as_deref()
            .ok_or(IncompleteTrigger("action"))?
            .parse::<TriggerAction>()
            .map_err(|_| IncompleteTrigger("action"))?;
        Ok(Trigger {
            id: Uuid::new_v4(),
            name: self.name.ok_or(IncompleteTrigger("name"))?,
            kind: self.kind.ok_or(IncompleteTrigger("type"))?,
            time: self.time.ok_or(IncompleteTrigger("time"))?,
            action,
            description: self.description,
            config: self.config,
            import_name: self.import_name,
            import_content: self.import_content,
            created_at: Utc::now(),
        })
    }
}

impl Trigger {
    pub fn fields(&self) -> TriggerFields<'_> {
        TriggerFields {
            name: non_empty(&self.name),
            kind: non_empty(&self.kind),
            time: non_empty(&self.time),
            action: Some(self.action.as_str()),
            import_name: self.import_name.as_deref(),
            import_content: self.import_content.as_deref(),
        }
    }
}

/// A required trigger field was absent when building a [`Trigger`] from a
/// [`TriggerSpec`]. Unreachable for specs that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteTrigger(pub &'static str);

impl fmt::Display for IncompleteTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger field '{}' is missing or malformed", self.0)
    }
}

impl std::error::Error for IncompleteTrigger {}

// ── Operations ────────────────────────────────────────────────

/// Audit record of one dispatch attempt. Created once, never mutated,
/// deleted only with its parent deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    /// Name of the scheduled deployment the dispatch targeted.
    pub target: String,
    #[serde(flatten)]
    pub outcome: OperationOutcome,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome {
    Success {
        /// Identifier of the provisioning API's own operation resource.
        result_id: String,
        /// Action the provisioning API reported (e.g. `insert`, `delete`).
        action: String,
        completed_at: DateTime<Utc>,
    },
    Failure {
        message: String,
        failed_at: DateTime<Utc>,
    },
}

impl Operation {
    pub fn success(
        target: impl Into<String>,
        result_id: impl Into<String>,
        action: impl Into<String>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            outcome: OperationOutcome::Success {
                result_id: result_id.into(),
                action: action.into(),
                completed_at,
            },
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(target: impl Into<String>, message: impl Into<String>, failed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            outcome: OperationOutcome::Failure {
                message: message.into(),
                failed_at,
            },
            recorded_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, OperationOutcome::Success { .. })
    }
}
