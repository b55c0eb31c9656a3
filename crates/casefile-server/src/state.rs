//! Shared application state.

use std::sync::Arc;

use casefile_core::CasefileConfig;
use casefile_runtime::Orchestrator;
use casefile_store::SqliteStore;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: CasefileConfig,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(config: CasefileConfig, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        self.orchestrator.store()
    }
}
