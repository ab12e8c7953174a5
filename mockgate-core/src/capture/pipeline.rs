//! Proxy-mode request flow.
//!
//! ```text
//! RECEIVED → FORWARDED → UPSTREAM_RESPONDED → REPLACED_BY_MOCK
//!                                           → PERSISTED
//!                                           → RELAYED (extension method)
//!          (upstream failure, offline replay) → OFFLINE_REPLAY
//! ```
//!
//! The upstream is always called first. A primary-layer match then replaces
//! the live body end to end; otherwise the live response is relayed unchanged
//! and queued for capture into the fallback directory. Methods no route key
//! can name are relayed without a capture.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::CaptureWriter;
use crate::fixture::{FixtureStore, LayerKind};
use crate::matcher::is_known_method;
use crate::realizer::{RealizedResponse, realize};
use crate::request::MockRequest;
use crate::resolver::resolve_request;
use crate::transport::{Upstream, UpstreamError};

/// How a proxied request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A primary fixture matched; the upstream body was discarded.
    ReplacedByMock,
    /// The live response was relayed and queued for capture.
    Persisted,
    /// The live response was relayed; its method has no fixture key form.
    Relayed,
    /// The upstream failed and a stored fixture was served instead.
    OfflineReplay,
}

impl CaptureOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReplacedByMock => "replaced_by_mock",
            Self::Persisted => "persisted",
            Self::Relayed => "relayed",
            Self::OfflineReplay => "offline_replay",
        }
    }
}

impl fmt::Display for CaptureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReply {
    pub outcome: CaptureOutcome,
    pub response: RealizedResponse,
}

pub struct CapturePipeline {
    store: Arc<FixtureStore>,
    upstream: Arc<dyn Upstream>,
    writer: CaptureWriter,
    offline_replay: bool,
}

impl CapturePipeline {
    pub fn new(
        store: Arc<FixtureStore>,
        upstream: Arc<dyn Upstream>,
        writer: CaptureWriter,
        offline_replay: bool,
    ) -> Self {
        Self {
            store,
            upstream,
            writer,
            offline_replay,
        }
    }

    pub fn writer(&self) -> &CaptureWriter {
        &self.writer
    }

    /// Run one request through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the [`UpstreamError`] when the upstream fails and offline replay
    /// is disabled or finds nothing.
    pub async fn handle(&self, request: &MockRequest) -> Result<PipelineReply, UpstreamError> {
        let kinds: &[LayerKind] = if self.offline_replay {
            &[LayerKind::Primary, LayerKind::Fallback]
        } else {
            &[LayerKind::Primary]
        };
        let layers = self.store.snapshot(kinds);

        let live = match self.upstream.forward(request).await {
            Ok(live) => live,
            Err(e) => {
                if self.offline_replay
                    && let Some(resolution) = resolve_request(request, &layers)
                {
                    info!(
                        method = %request.method(),
                        path = %request.path(),
                        key = %resolution.key(),
                        layer = %resolution.layer_kind(),
                        error = %e,
                        "Upstream unavailable, serving stored fixture"
                    );
                    return Ok(PipelineReply {
                        outcome: CaptureOutcome::OfflineReplay,
                        response: realize(&resolution, request).await,
                    });
                }
                warn!(method = %request.method(), path = %request.path(), error = %e, "Upstream request failed");
                return Err(e);
            }
        };

        if let Some(resolution) = resolve_request(request, &layers[..1]) {
            debug!(
                method = %request.method(),
                path = %request.path(),
                key = %resolution.key(),
                "Primary fixture replaces upstream response"
            );
            return Ok(PipelineReply {
                outcome: CaptureOutcome::ReplacedByMock,
                response: realize(&resolution, request).await,
            });
        }

        let outcome = if is_known_method(request.method()) {
            let file = self
                .writer
                .submit(request.method(), request.path(), live.body.clone());
            debug!(method = %request.method(), path = %request.path(), file = %file, "Capture queued");
            CaptureOutcome::Persisted
        } else {
            debug!(method = %request.method(), path = %request.path(), "Extension method relayed without capture");
            CaptureOutcome::Relayed
        };

        Ok(PipelineReply {
            outcome,
            response: RealizedResponse {
                status: live.status,
                headers: live.headers,
                body: live.body,
            },
        })
    }
}

impl fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("capture_dir", &self.writer.directory())
            .field("offline_replay", &self.offline_replay)
            .finish()
    }
}
