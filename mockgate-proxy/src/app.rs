//! Startup wiring shared by the binary and the integration tests.

use std::sync::Arc;

use mockgate_core::config::Settings;
use mockgate_core::error::MockGateError;
use mockgate_core::fixture::{FixtureStore, FixtureWatcher, LayerKind};
use mockgate_core::handler::HandlerRegistry;
use tracing::warn;

use crate::mock_service::MockService;

/// Everything a running server holds on to.
#[derive(Debug)]
pub struct App {
    pub store: Arc<FixtureStore>,
    pub service: MockService,
    pub watchers: Vec<FixtureWatcher>,
}

impl App {
    /// Load fixtures and build the request service. With `watch` set, hot
    /// reload is started for both layers.
    ///
    /// The service is built before any watcher so the capture directory
    /// already exists when the fallback watcher attaches to it.
    ///
    /// # Errors
    ///
    /// Propagates [`MockService::from_settings`] failures.
    pub fn build(settings: &Settings, watch: bool) -> Result<Self, MockGateError> {
        let store = Arc::new(FixtureStore::from_settings(
            settings,
            Arc::new(HandlerRegistry::with_builtins()),
        ));
        let service = MockService::from_settings(settings, store.clone())?;
        let watchers = if watch { spawn_watchers(&store) } else { Vec::new() };

        Ok(Self {
            store,
            service,
            watchers,
        })
    }
}

/// A layer whose directory cannot be watched keeps its startup contents.
fn spawn_watchers(store: &Arc<FixtureStore>) -> Vec<FixtureWatcher> {
    [LayerKind::Primary, LayerKind::Fallback]
        .into_iter()
        .filter_map(|kind| match FixtureWatcher::spawn(store.clone(), kind) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(layer = %kind, error = %e, "Hot reload disabled for layer");
                None
            }
        })
        .collect()
}
