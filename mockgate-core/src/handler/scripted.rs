//! Declarative computable fixtures.
//!
//! ```yaml
//! "POST /orders":
//!   $handler:
//!     status: 201
//!     headers:
//!       x-order-source: mock
//!     delayMs: 250
//!     lossPercent: 10
//!     body:
//!       id: "{{body.id}}"
//!       path: "{{path}}"
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use super::template::TemplateContext;
use super::{FixtureHandler, HandlerError};
use crate::matcher::PathParams;
use crate::request::{MockRequest, ResponseControl};

/// The `$handler` object as written in a fixture file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScriptedSpec {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Latency simulation.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Probability, in percent, that the request fails with [`HandlerError::DataLoss`].
    #[serde(default)]
    pub loss_percent: Option<f64>,
    /// Always fail with this message.
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub body: Value,
}

/// A handler compiled from a [`ScriptedSpec`].
#[derive(Debug, Clone)]
pub struct ScriptedHandler {
    status: StatusCode,
    headers: HeaderMap,
    delay: Option<Duration>,
    loss_percent: f64,
    fail: Option<String>,
    body: Value,
}

/// Returned when a scripted declaration cannot be turned into a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptedSpecError {
    #[error("invalid $handler declaration: {0}")]
    Parse(String),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("invalid response header '{0}'")]
    InvalidHeader(String),

    #[error("lossPercent must be between 0 and 100")]
    InvalidLossPercent,
}

impl ScriptedHandler {
    pub fn from_spec(spec: ScriptedSpec) -> Result<Self, ScriptedSpecError> {
        let status = match spec.status {
            Some(code) => {
                StatusCode::from_u16(code).map_err(|_| ScriptedSpecError::InvalidStatus(code))?
            }
            None => StatusCode::OK,
        };

        let mut headers = HeaderMap::with_capacity(spec.headers.len());
        for (name, value) in &spec.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ScriptedSpecError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ScriptedSpecError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }

        let loss_percent = spec.loss_percent.unwrap_or(0.0);
        if !(0.0..=100.0).contains(&loss_percent) {
            return Err(ScriptedSpecError::InvalidLossPercent);
        }

        Ok(Self {
            status,
            headers,
            delay: spec.delay_ms.filter(|ms| *ms > 0).map(Duration::from_millis),
            loss_percent,
            fail: spec.fail,
            body: spec.body,
        })
    }

    /// Parse the `$handler` object and compile it.
    pub fn from_value(value: &Value) -> Result<Self, ScriptedSpecError> {
        let spec: ScriptedSpec = serde_json::from_value(value.clone())
            .map_err(|e| ScriptedSpecError::Parse(e.to_string()))?;
        Self::from_spec(spec)
    }
}

fn roll_loss(percent: f64) -> bool {
    percent > 0.0 && rand::rng().random_range(0.0..100.0) < percent
}

#[async_trait]
impl FixtureHandler for ScriptedHandler {
    async fn call(
        &self,
        request: &MockRequest,
        params: &PathParams,
        control: &mut ResponseControl,
    ) -> Result<Value, HandlerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if roll_loss(self.loss_percent) {
            return Err(HandlerError::DataLoss);
        }

        if let Some(message) = &self.fail {
            return Err(HandlerError::Failed(message.clone()));
        }

        control.set_status(self.status);
        for (name, value) in &self.headers {
            control.headers_mut().insert(name.clone(), value.clone());
        }

        Ok(TemplateContext::new(request, params).render(&self.body))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
