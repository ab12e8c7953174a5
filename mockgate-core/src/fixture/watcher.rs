//! Hot reload: one watcher task per layer.
//!
//! The notify backend pushes raw events into a channel; the task filters them
//! down to visible fixture files, coalesces a burst into a single reload and
//! runs the rebuild on the blocking pool. Dropping the [`FixtureWatcher`]
//! stops watching and ends the task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::loader::is_visible_fixture;
use super::store::FixtureStore;
use super::LayerKind;

/// Window in which further events are folded into the pending reload.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to create file watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Keeps one layer in sync with its directory.
pub struct FixtureWatcher {
    kind: LayerKind,
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl FixtureWatcher {
    /// Start watching the directory of `kind`. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<FixtureStore>, kind: LayerKind) -> Result<Self, WatchError> {
        Self::spawn_with_debounce(store, kind, DEFAULT_DEBOUNCE)
    }

    pub fn spawn_with_debounce(
        store: Arc<FixtureStore>,
        kind: LayerKind,
        debounce: Duration,
    ) -> Result<Self, WatchError> {
        let directory = store.directory(kind).to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(WatchError::Create)?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: directory.clone(),
                source,
            })?;

        debug!(layer = %kind, directory = %directory.display(), "Watching fixture directory");

        let task = tokio::spawn(run(store, kind, rx, debounce));

        Ok(Self {
            kind,
            _watcher: watcher,
            task,
        })
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }
}

impl std::fmt::Debug for FixtureWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureWatcher")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Drop for FixtureWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
        && event.paths.iter().any(|path| is_visible_fixture(path))
}

async fn run(
    store: Arc<FixtureStore>,
    kind: LayerKind,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    debounce: Duration,
) {
    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) if is_relevant(&event) => {
                debug!(layer = %kind, paths = ?event.paths, "Fixture change detected");
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(layer = %kind, error = %e, "File watcher error");
                continue;
            }
        }

        // Fold the rest of the burst into this reload.
        let deadline = Instant::now() + debounce;
        let mut closed = false;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let reload_store = Arc::clone(&store);
        if let Err(e) = tokio::task::spawn_blocking(move || reload_store.reload(kind)).await {
            warn!(layer = %kind, error = %e, "Fixture reload task failed");
        }

        if closed {
            break;
        }
    }
    debug!(layer = %kind, "Fixture watcher stopped");
}
