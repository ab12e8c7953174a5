//! The request-serving tower service.
//!
//! `OPTIONS` is answered directly. Every other request has its body buffered
//! (bounded by `maxBodySize`) and is then either resolved against the fixture
//! layers (mock mode) or run through the [`CapturePipeline`] (proxy mode).
//! CORS headers are added to every response, errors included.
//!
//! How each request was answered is recorded on the enclosing request span
//! (`route`, `layer`, `outcome`), see [`crate::logging_layer`].

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{Method, Request, Response, StatusCode};
use mockgate_core::MockRequest;
use mockgate_core::capture::{CapturePipeline, CaptureWriter};
use mockgate_core::config::Settings;
use mockgate_core::error::MockGateError;
use mockgate_core::fixture::FixtureStore;
use mockgate_core::realizer::{RealizedResponse, realize};
use mockgate_core::resolver::Resolver;
use mockgate_core::transport::{UpstreamClient, UpstreamConfig};
use tower::Service;
use tracing::{Span, debug, field, info};

use crate::cors::apply_cors;
use crate::error::{ProxyError, ProxyResult};

/// What answers non-preflight requests.
#[derive(Debug)]
pub enum Backend {
    Mock(Resolver),
    Listen(CapturePipeline),
}

#[derive(Debug, Clone)]
pub struct MockService {
    backend: Arc<Backend>,
    max_body_size: usize,
}

impl MockService {
    pub fn new(backend: Backend, max_body_size: usize) -> Self {
        Self {
            backend: Arc::new(backend),
            max_body_size,
        }
    }

    /// Build the backend the settings ask for.
    ///
    /// In proxy mode this creates the capture directory and the upstream
    /// client; `useTempMock` turns on offline replay. In mock mode the
    /// resolver consults primary, then fallback when `useTempMock` is set.
    ///
    /// # Errors
    ///
    /// Returns [`MockGateError::Capture`] if the capture directory cannot be
    /// created and [`MockGateError::Upstream`] if the upstream URL is unusable.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<FixtureStore>,
    ) -> Result<Self, MockGateError> {
        let backend = match UpstreamConfig::from_settings(settings) {
            Some(config) => {
                let writer = CaptureWriter::new(settings.fallback_dir());
                writer.ensure_directory()?;
                let upstream = Arc::new(UpstreamClient::new(config)?);
                Backend::Listen(CapturePipeline::new(
                    store,
                    upstream,
                    writer,
                    settings.use_temp_mock,
                ))
            }
            None => Backend::Mock(Resolver::new(store, settings.resolution_order())),
        };
        Ok(Self::new(backend, settings.max_body_size))
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let request_headers = request.headers().clone();

        let mut response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                Span::current().record("outcome", "error");
                debug!(error = %e, "Request failed");
                e.to_response()
            }
        };

        apply_cors(&request_headers, response.headers_mut());
        response
    }

    async fn dispatch<B>(&self, request: Request<B>) -> ProxyResult<Response<Full<Bytes>>>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let span = Span::current();
        if request.method() == Method::OPTIONS {
            span.record("outcome", "preflight");
            return Ok(empty_response(StatusCode::OK));
        }

        let (parts, body) = request.into_parts();
        let body = read_body(body, self.max_body_size).await?;
        let request = MockRequest::from_parts(&parts, body);

        match self.backend.as_ref() {
            Backend::Mock(resolver) => match resolver.resolve(&request) {
                Some(resolution) => {
                    span.record("route", resolution.key());
                    span.record("layer", field::display(resolution.layer_kind()));
                    span.record("outcome", "mock_hit");
                    Ok(into_response(realize(&resolution, &request).await))
                }
                None => {
                    span.record("outcome", "not_found");
                    info!(signature = %request.signature(), "No fixture matched");
                    Ok(empty_response(StatusCode::NOT_FOUND))
                }
            },
            Backend::Listen(pipeline) => {
                let reply = pipeline.handle(&request).await?;
                span.record("outcome", reply.outcome.as_str());
                Ok(into_response(reply.response))
            }
        }
    }
}

async fn read_body<B>(body: B, limit: usize) -> ProxyResult<Bytes>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ProxyError::BodyTooLarge { limit })
        }
        Err(e) => Err(ProxyError::BodyRead(e.to_string())),
    }
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn into_response(realized: RealizedResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(realized.body));
    *response.status_mut() = realized.status;
    *response.headers_mut() = realized.headers;
    response
}

impl<B> Service<Request<B>> for MockService
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Response = Response<Full<Bytes>>;
    type Error = ProxyError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(request).await) })
    }
}
