//! Active-trigger selection and winner priority.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use cadence_core::model::Trigger;

use crate::error::EngineError;
use crate::validate::validate_trigger;
use crate::window::evaluate_window;

/// A trigger paired with the occurrence timestamp that put it inside the
/// current dispatch window. Transient; lives only for one evaluation pass.
#[derive(Debug, Clone, Copy)]
pub struct ActiveTrigger<'a> {
    pub trigger: &'a Trigger,
    pub timestamp: DateTime<Utc>,
}

/// Compute the subset of `triggers` that should act this pass.
///
/// Every trigger is validated first; a single malformed trigger rejects
/// the whole batch for its parent deployment (all-or-nothing). Valid
/// triggers whose crontab puts an occurrence inside the dispatch window
/// are returned in input order.
pub fn select_active<'a>(
    triggers: &'a [Trigger],
    now: DateTime<Utc>,
    interval_minutes: u32,
    last_dispatched: DateTime<Utc>,
) -> Result<Vec<ActiveTrigger<'a>>, EngineError> {
    for trigger in triggers {
        validate_trigger(&trigger.fields())?;
    }

    let mut active = Vec::new();
    for trigger in triggers {
        if let Some(timestamp) = evaluate_window(now, interval_minutes, &trigger.time, last_dispatched)? {
            active.push(ActiveTrigger { trigger, timestamp });
        }
    }
    Ok(active)
}

/// Priority order: later occurrence timestamp first, then lexicographically
/// greater trigger name. Deterministic for distinct names regardless of
/// input order.
fn priority(a: &ActiveTrigger<'_>, b: &ActiveTrigger<'_>) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.trigger.name.cmp(&b.trigger.name))
}

/// Pick the single trigger to act on, or `None` when nothing is active.
pub fn select_winner<'a, 'b>(active: &'b [ActiveTrigger<'a>]) -> Option<&'b ActiveTrigger<'a>> {
    active.iter().max_by(|a, b| priority(a, b))
}
