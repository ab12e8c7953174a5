//! Per-key serialized capture persistence.
//!
//! Each capture file has at most one pending write slot. A submit for a file
//! that already has a pending capture replaces it; a single drain task per
//! file writes whatever is pending until the slot is empty. Writes for one
//! file therefore never interleave and the last submitted capture wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use http::Method;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{CaptureError, capture_document, capture_file_name, capture_key};

/// A capture waiting to be written.
#[derive(Debug, Clone)]
pub struct PendingCapture {
    /// Fixture key, `METHOD PATH`.
    pub key: String,
    pub body: Bytes,
}

struct Inner {
    directory: PathBuf,
    slots: DashMap<String, Option<PendingCapture>>,
    idle: Notify,
}

/// Writes captures into the fallback directory.
#[derive(Clone)]
pub struct CaptureWriter {
    inner: Arc<Inner>,
}

impl CaptureWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                directory: directory.into(),
                slots: DashMap::new(),
                idle: Notify::new(),
            }),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    /// Create the capture directory if it does not exist.
    pub fn ensure_directory(&self) -> Result<(), CaptureError> {
        std::fs::create_dir_all(&self.inner.directory).map_err(|source| CaptureError::CreateDir {
            path: self.inner.directory.clone(),
            source,
        })
    }

    /// Queue a capture of `body` for `method` + `path` and return the file
    /// name it will be written to. Must be called inside a Tokio runtime.
    pub fn submit(&self, method: &Method, path: &str, body: Bytes) -> String {
        let file_name = capture_file_name(method, path);
        let pending = PendingCapture {
            key: capture_key(method, path),
            body,
        };

        let spawn_drain = match self.inner.slots.entry(file_name.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_some() {
                    debug!(file = %file_name, "Superseding pending capture");
                }
                slot.insert(Some(pending));
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Some(pending));
                true
            }
        };

        if spawn_drain {
            tokio::spawn(drain_slot(Arc::clone(&self.inner), file_name.clone()));
        }
        file_name
    }

    /// Resolves once no capture is pending or being written.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.slots.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

async fn drain_slot(inner: Arc<Inner>, file_name: String) {
    loop {
        let next = match inner.slots.get_mut(&file_name) {
            Some(mut slot) => slot.take(),
            None => break,
        };

        let Some(pending) = next else {
            // Leave the slot in place if a capture arrived since the take.
            if inner
                .slots
                .remove_if(&file_name, |_, slot| slot.is_none())
                .is_some()
            {
                break;
            }
            continue;
        };

        match write_capture(&inner.directory, &file_name, &pending).await {
            Ok(path) => debug!(key = %pending.key, file = %path.display(), "Capture written"),
            Err(e) => warn!(key = %pending.key, error = %e, "Failed to persist capture"),
        }
    }

    if inner.slots.is_empty() {
        inner.idle.notify_waiters();
    }
}

/// Write the capture document atomically: temp file then rename.
async fn write_capture(
    directory: &Path,
    file_name: &str,
    pending: &PendingCapture,
) -> Result<PathBuf, CaptureError> {
    let document = capture_document(&pending.key, &pending.body);
    let mut encoded = serde_json::to_vec_pretty(&document).map_err(|source| CaptureError::Encode {
        key: pending.key.clone(),
        source,
    })?;
    encoded.push(b'\n');

    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|source| CaptureError::CreateDir {
            path: directory.to_path_buf(),
            source,
        })?;

    let target = directory.join(file_name);
    // Hidden name so the watcher ignores the partial file.
    let temp = directory.join(format!(".{file_name}.tmp"));

    tokio::fs::write(&temp, &encoded)
        .await
        .map_err(|source| CaptureError::Write {
            path: temp.clone(),
            source,
        })?;
    tokio::fs::rename(&temp, &target)
        .await
        .map_err(|source| CaptureError::Write {
            path: target.clone(),
            source,
        })?;

    Ok(target)
}
