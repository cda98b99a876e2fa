//! Periodic trigger-evaluation loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use cadence_engine::DispatchCoordinator;

/// Run evaluation passes forever, one every `poll_seconds`.
///
/// Passes run sequentially: the next sleep starts only after the previous
/// pass finishes, so two passes never evaluate the same deployment at once.
/// Sleeps first so a restart does not immediately re-dispatch.
pub async fn run(coordinator: Arc<DispatchCoordinator>, poll_seconds: u64) {
    info!(poll_seconds, "dispatch loop started");
    loop {
        tokio::time::sleep(Duration::from_secs(poll_seconds)).await;
        if let Err(e) = coordinator.dispatch_all(Utc::now()).await {
            warn!(error = %e, "dispatch pass aborted");
        }
    }
}
