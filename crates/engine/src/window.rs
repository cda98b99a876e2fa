//! Cron dispatch-window evaluation.
//!
//! Decides whether an evaluation pass at `now` should act on a crontab
//! schedule. An occurrence is actionable when it falls within half the
//! dispatch interval on either side of `now` (boundaries inclusive), or
//! when the most recent occurrence was never dispatched (recovery).

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use crate::error::EngineError;

/// Lookback horizons (days) for the previous-occurrence search. Widened
/// only when the nearer horizon holds no occurrence, so dense schedules
/// never pay for the distant scans. The last horizon covers the longest
/// gap a real cron schedule produces, Feb 29 across a skipped century
/// leap year (8 years).
const PREV_LOOKBACK_DAYS: [i64; 4] = [1, 35, 400, 3000];

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for
/// seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month
/// day-of-week`. Trigger schedules use standard 5-field cron.
fn normalize_cron(cron_5field: &str) -> String {
    let trimmed = cron_5field.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Parse a trigger's crontab, surfacing failures as
/// [`EngineError::InvalidScheduleFormat`].
pub(crate) fn parse_crontab(crontab: &str) -> Result<Schedule, EngineError> {
    let normalized = normalize_cron(crontab);
    Schedule::from_str(&normalized).map_err(|e| EngineError::InvalidScheduleFormat {
        expression: crontab.to_string(),
        message: e.to_string(),
    })
}

/// Earliest scheduled occurrence at or after `now`.
fn next_occurrence(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    // `after` yields strictly-later instants; back off one second so an
    // occurrence landing exactly on `now` is still returned.
    schedule
        .after(&(now - Duration::seconds(1)))
        .find(|t| *t >= now)
}

/// Latest scheduled occurrence strictly before `now`, searching back at
/// most [`PREV_LOOKBACK_DAYS`] days. Occurrences older than the widest
/// horizon read as `None`, which disables the backward-window and
/// recovery rules for that schedule.
fn prev_occurrence(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    for days in PREV_LOOKBACK_DAYS {
        let start = now - Duration::days(days);
        if let Some(prev) = schedule.after(&start).take_while(|t| *t < now).last() {
            return Some(prev);
        }
    }
    None
}

/// Determine whether `now` falls within the current dispatch window of
/// `crontab`. Returns the occurrence to dispatch for, or `None` when
/// nothing is due this pass.
///
/// Decision order, first match wins:
/// 1. the upcoming occurrence is within `interval/2` minutes ahead
/// 2. the previous occurrence is within `interval/2` minutes behind
/// 3. the previous occurrence was never dispatched (missed-window recovery)
///
/// Pure function of its arguments; window boundaries are inclusive.
pub fn evaluate_window(
    now: DateTime<Utc>,
    interval_minutes: u32,
    crontab: &str,
    last_dispatched: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    let schedule = parse_crontab(crontab)?;
    let half_window = Duration::seconds(i64::from(interval_minutes) * 60 / 2);

    if let Some(next) = next_occurrence(&schedule, now) {
        if next <= now + half_window {
            return Ok(Some(next));
        }
    }

    match prev_occurrence(&schedule, now) {
        Some(prev) if prev >= now - half_window => Ok(Some(prev)),
        // A prior pass was skipped or failed; catch up on the missed
        // occurrence.
        Some(prev) if last_dispatched < prev => Ok(Some(prev)),
        _ => Ok(None),
    }
}
