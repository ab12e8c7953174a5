//! Computable fixtures.
//!
//! A fixture value is either static JSON or a [`FixtureHandler`]. Handlers
//! receive the inbound request, the captured path parameters and a mutable
//! [`ResponseControl`], may suspend, and return the body value or fail.
//!
//! Two kinds of handlers can appear in fixture files:
//!
//! - `{"$handler": {...}}`: a [`ScriptedHandler`] built from the declaration
//!   (status, headers, latency, data-loss simulation, templated body).
//! - `{"$handler": "name"}`: a handler registered in a [`HandlerRegistry`].

mod registry;
mod scripted;
mod template;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::matcher::PathParams;
use crate::request::{MockRequest, ResponseControl};

pub use registry::{EchoHandler, HandlerRegistry};
pub use scripted::{ScriptedHandler, ScriptedSpec, ScriptedSpecError};

/// Handler invocation failures. Each one turns into a `500` for its request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Simulated data loss (`lossPercent`).
    #[error("simulated data loss")]
    DataLoss,

    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// A computable fixture.
#[async_trait]
pub trait FixtureHandler: Send + Sync {
    /// Produce the response body. `Value::Null` means an empty body.
    async fn call(
        &self,
        request: &MockRequest,
        params: &PathParams,
        control: &mut ResponseControl,
    ) -> Result<Value, HandlerError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
