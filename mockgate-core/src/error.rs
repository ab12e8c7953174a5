//! Error taxonomy for mockgate.
//!
//! Each concern owns its error enum; [`MockGateError`] gathers them for
//! callers that drive several components. None of them is fatal once the
//! server is running:
//!
//! | Error | Raised by | Outcome |
//! |-------|-----------|---------|
//! | [`ConfigError`] | config file loading | defaults are used, warning logged |
//! | [`FixtureLoadError`] | fixture directory / file loading | empty layer or skipped entry, warning logged |
//! | [`PatternError`] | route key compilation | entry skipped, warning logged |
//! | [`HandlerError`] | computable fixtures | `500` for that request |
//! | [`UpstreamError`] | proxy forwarding | `500` for that request |
//! | [`CaptureError`] | capture persistence | logged only |
//! | [`WatchError`] | hot reload setup | layer keeps its startup contents |

use thiserror::Error;

pub use crate::capture::CaptureError;
pub use crate::config::ConfigError;
pub use crate::fixture::FixtureLoadError;
pub use crate::fixture::watcher::WatchError;
pub use crate::handler::HandlerError;
pub use crate::matcher::PatternError;
pub use crate::transport::UpstreamError;

#[derive(Debug, Error)]
pub enum MockGateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    FixtureLoad(#[from] FixtureLoadError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Watch(#[from] WatchError),
}
