//! Errors raised while serving a request, and their HTTP mapping.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use mockgate_core::transport::UpstreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// Request body over `maxBodySize` (413).
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Client went away or sent a malformed body (400).
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// Upstream failure with nothing to replay (500, empty body).
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ProxyError {
    /// Convert error to HTTP response with appropriate status code.
    pub fn to_response(&self) -> Response<Full<Bytes>> {
        let (status, message) = match self {
            ProxyError::BodyTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "413 Payload Too Large\n\nRequest body exceeds the configured limit.",
            ),
            ProxyError::BodyRead(_) => (
                StatusCode::BAD_REQUEST,
                "400 Bad Request\n\nFailed to read request body.",
            ),
            ProxyError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, ""),
        };

        let mut builder = Response::builder().status(status);
        if !message.is_empty() {
            builder = builder.header("Content-Type", "text/plain");
        }
        builder
            .body(Full::new(Bytes::from(message)))
            .unwrap_or_else(|_| {
                let mut resp = Response::new(Full::new(Bytes::new()));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            })
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
