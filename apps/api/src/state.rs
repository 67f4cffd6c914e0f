use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::coordinator::GenerationCoordinator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Single entry point for starting and managing generation runs. Holds
    /// the in-flight registry and the admission semaphore.
    pub coordinator: Arc<GenerationCoordinator>,
}
