//! Response Realizer: turns a resolved fixture into a concrete response.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures_util::FutureExt;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::StatusCode;
use serde_json::Value;
use tracing::{debug, error};

use crate::fixture::FixtureValue;
use crate::handler::{FixtureHandler, HandlerError};
use crate::matcher::PathParams;
use crate::request::{MockRequest, ResponseControl};
use crate::resolver::Resolution;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";

/// A fully buffered response ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RealizedResponse {
    /// The fixed outcome for handler and upstream failures: `500`, empty body.
    pub fn server_error() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// `200` with the serialized static value.
    pub fn from_value(value: &Value) -> Self {
        let mut response = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        response.set_body(value);
        response
    }

    /// Serialize `value` into the body. Strings go out verbatim as text, null
    /// as an empty body, anything else as JSON. An existing `content-type`
    /// header is left alone.
    fn set_body(&mut self, value: &Value) {
        let (body, content_type) = match value {
            Value::Null => (Bytes::new(), None),
            Value::String(text) => (Bytes::from(text.clone()), Some(TEXT_PLAIN)),
            other => (Bytes::from(other.to_string()), Some(APPLICATION_JSON)),
        };
        if let Some(content_type) = content_type
            && !self.headers.contains_key(CONTENT_TYPE)
        {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        self.body = body;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a computable fixture, catching panics.
pub async fn invoke(
    handler: &dyn FixtureHandler,
    request: &MockRequest,
    params: &PathParams,
) -> Result<RealizedResponse, HandlerError> {
    let mut control = ResponseControl::new();
    let outcome = AssertUnwindSafe(handler.call(request, params, &mut control))
        .catch_unwind()
        .await;

    let value = match outcome {
        Ok(result) => result?,
        Err(payload) => return Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    };

    let (status, headers) = control.into_parts();
    let mut response = RealizedResponse {
        status,
        headers,
        body: Bytes::new(),
    };
    response.set_body(&value);
    Ok(response)
}

/// Render a resolution. Handler failures are logged and become
/// [`RealizedResponse::server_error`]; this never fails.
pub async fn realize(resolution: &Resolution, request: &MockRequest) -> RealizedResponse {
    match resolution.value() {
        FixtureValue::Static(value) => RealizedResponse::from_value(value),
        FixtureValue::Computable(handler) => {
            match invoke(handler.as_ref(), request, resolution.params()).await {
                Ok(response) => {
                    debug!(
                        key = %resolution.key(),
                        handler = handler.name(),
                        status = %response.status,
                        "Handler completed"
                    );
                    response
                }
                Err(e) => {
                    error!(
                        key = %resolution.key(),
                        handler = handler.name(),
                        method = %request.method(),
                        path = %request.path(),
                        error = %e,
                        "Fixture handler failed"
                    );
                    RealizedResponse::server_error()
                }
            }
        }
    }
}
