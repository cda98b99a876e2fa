//! Shared application state for the HTTP surface.

use std::sync::Arc;

use cadence_engine::Repository;

pub struct AppState {
    pub repo: Arc<dyn Repository>,
    /// Which repository backend is in use ("postgres" or "memory").
    pub backend: &'static str,
}
