//! Application state shared across handlers.

use std::sync::Arc;

use anyhow::Context;
use turnstile_core::{Orchestrator, StoreHandle, TurnstileConfig};

/// Shared application state.
///
/// Cheap to clone; every handler gets its own copy.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Alias used by handler signatures.
pub type SharedState = AppState;

struct AppStateInner {
    config: TurnstileConfig,
    orchestrator: Orchestrator,
}

impl AppState {
    /// Open the configured store and build the redemption pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn new(config: TurnstileConfig) -> anyhow::Result<Self> {
        let store = config
            .open_store()
            .with_context(|| format!("failed to open {:?} store", config.store.backend))?;
        Ok(Self::with_store(config, store))
    }

    /// Build state over an already-open store.
    #[must_use]
    pub fn with_store(config: TurnstileConfig, store: StoreHandle) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator: Orchestrator::new(store),
            }),
        }
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &TurnstileConfig {
        &self.inner.config
    }

    /// The redemption pipeline.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }
}
