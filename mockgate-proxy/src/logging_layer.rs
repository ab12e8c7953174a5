//! Per-request tracing for the mock server.
//!
//! Every request runs inside a `mockgate.request` span. The span starts with
//! the method, path and a request id; [`crate::mock_service`] fills in the
//! fixture `route`, the `layer` it came from and the `outcome` once the
//! request has been answered, so the single "Request completed" line carries
//! how the answer was produced.
//!
//! Header dumps are only rendered at debug level. Credentials are masked,
//! and so is every header named in the `headers` setting.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use http::{HeaderMap, HeaderValue, Request, Response};
use rand::Rng;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, MakeSpan, OnFailure, OnRequest, OnResponse, TraceLayer,
};
use tracing::{Level, Span, debug, field, info, warn};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const ALWAYS_MASKED: [&str; 6] = [
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
];

const HEADER_DUMP_LIMIT: usize = 32;
const HEADER_VALUE_LIMIT: usize = 256;

pub type MockTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    RequestSpan,
    LogRequest,
    LogResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    LogFailure,
>;

/// Build the tracing layer. `configured` lists the header names from the
/// `headers` setting; their values are masked alongside the built-in set.
pub fn logging_layer<I, S>(configured: I) -> MockTraceLayer
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let masked = Arc::new(MaskedHeaders::new(configured));
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_request(LogRequest {
            masked: masked.clone(),
        })
        .on_response(LogResponse { masked })
        .on_failure(LogFailure)
}

static PROCESS_TAG: LazyLock<u32> = LazyLock::new(|| rand::rng().random());
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

/// `{process tag}-{sequence}`; the tag differs between runs.
pub fn next_request_id() -> String {
    format!(
        "{:08x}-{}",
        *PROCESS_TAG,
        REQUEST_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

#[derive(Clone, Copy, Debug)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = match request.headers().get(REQUEST_ID_HEADER).map(HeaderValue::to_str) {
            Some(Ok(id)) if !id.is_empty() => id.to_owned(),
            _ => next_request_id(),
        };

        tracing::info_span!(
            "mockgate.request",
            method = %request.method(),
            path = request.uri().path(),
            request_id = %request_id,
            route = field::Empty,
            layer = field::Empty,
            outcome = field::Empty,
        )
    }
}

#[derive(Clone, Debug)]
pub struct LogRequest {
    masked: Arc<MaskedHeaders>,
}

impl<B> OnRequest<B> for LogRequest {
    fn on_request(&mut self, request: &Request<B>, _span: &Span) {
        if tracing::enabled!(Level::DEBUG) {
            debug!(
                query = request.uri().query().unwrap_or(""),
                headers = ?self.masked.render(request.headers()),
                "Request received"
            );
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogResponse {
    masked: Arc<MaskedHeaders>,
}

impl<B> OnResponse<B> for LogResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        info!(
            status = response.status().as_u16(),
            latency_ms = latency.as_millis() as u64,
            "Request completed"
        );
        if tracing::enabled!(Level::DEBUG) {
            debug!(headers = ?self.masked.render(response.headers()), "Response headers");
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LogFailure;

impl OnFailure<ServerErrorsFailureClass> for LogFailure {
    fn on_failure(&mut self, failure: ServerErrorsFailureClass, latency: Duration, _span: &Span) {
        warn!(
            failure = %failure,
            latency_ms = latency.as_millis() as u64,
            "Request answered with a server error"
        );
    }
}

/// Lower-cased names whose values never reach the log.
#[derive(Debug, Default)]
pub struct MaskedHeaders {
    names: BTreeSet<String>,
}

impl MaskedHeaders {
    pub fn new<I, S>(configured: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = ALWAYS_MASKED
            .iter()
            .map(|name| (*name).to_owned())
            .chain(
                configured
                    .into_iter()
                    .map(|name| name.as_ref().to_ascii_lowercase()),
            )
            .collect();
        Self { names }
    }

    pub fn is_masked(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    /// A `Debug` view of `headers` with masked values hidden and long or
    /// binary values shortened.
    pub fn render<'a>(&'a self, headers: &'a HeaderMap) -> HeaderDump<'a> {
        HeaderDump {
            headers,
            masked: self,
        }
    }
}

pub struct HeaderDump<'a> {
    headers: &'a HeaderMap,
    masked: &'a MaskedHeaders,
}

impl fmt::Debug for HeaderDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.headers.iter().take(HEADER_DUMP_LIMIT).map(|(name, value)| {
            let name = name.as_str();
            let value = if self.masked.is_masked(name) {
                Cow::Borrowed("***")
            } else {
                printable(value)
            };
            (name, value)
        });

        let mut map = f.debug_map();
        map.entries(shown);
        let hidden = self.headers.len().saturating_sub(HEADER_DUMP_LIMIT);
        if hidden > 0 {
            map.entry(&"omitted", &hidden);
        }
        map.finish()
    }
}

fn printable(value: &HeaderValue) -> Cow<'_, str> {
    match value.to_str() {
        // to_str only accepts visible ASCII, so any byte index is a char boundary.
        Ok(text) if text.len() > HEADER_VALUE_LIMIT => Cow::Owned(format!(
            "{}[+{} bytes]",
            &text[..HEADER_VALUE_LIMIT],
            text.len() - HEADER_VALUE_LIMIT
        )),
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(format!("[{} non-text bytes]", value.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_service::{Backend, MockService};
    use bytes::Bytes;
    use http_body_util::Full;
    use mockgate_core::fixture::{FixtureStore, LayerKind};
    use mockgate_core::handler::HandlerRegistry;
    use mockgate_core::resolver::Resolver;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::{ServiceBuilder, ServiceExt};
    use tracing::span::{Attributes, Id, Record};
    use tracing::subscriber::Subscriber;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;

    /// Collects every field recorded on `mockgate.request` spans.
    #[derive(Clone, Default)]
    struct SpanFields(Arc<Mutex<HashMap<String, String>>>);

    struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

    impl field::Visit for FieldVisitor<'_> {
        fn record_str(&mut self, field: &field::Field, value: &str) {
            self.0.insert(field.name().to_owned(), value.to_owned());
        }

        fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_owned(), format!("{value:?}"));
        }
    }

    impl<S> Layer<S> for SpanFields
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            if attrs.metadata().name() == "mockgate.request" {
                attrs.record(&mut FieldVisitor(&mut self.0.lock().unwrap()));
            }
        }

        fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
            if ctx.span(id).is_some_and(|s| s.name() == "mockgate.request") {
                values.record(&mut FieldVisitor(&mut self.0.lock().unwrap()));
            }
        }
    }

    #[tokio::test]
    async fn test_span_carries_route_layer_and_outcome() {
        let fields = SpanFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"GET /orders/:id": {"id": 1}}"#).unwrap();
        let store = Arc::new(FixtureStore::open(
            dir.path(),
            dir.path().join("_captures"),
            Arc::new(HandlerRegistry::with_builtins()),
        ));
        let service = MockService::new(
            Backend::Mock(Resolver::new(store, vec![LayerKind::Primary])),
            1024,
        );
        let stack = ServiceBuilder::new()
            .layer(logging_layer(["X-Tenant"]))
            .service(service);

        let request = Request::builder()
            .uri("/orders/1?expand=true")
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = stack.oneshot(request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let fields = fields.0.lock().unwrap();
        assert_eq!(fields["method"], "GET");
        assert_eq!(fields["path"], "/orders/1");
        assert_eq!(fields["request_id"], "req-42");
        assert_eq!(fields["route"], "GET /orders/:id");
        assert_eq!(fields["layer"], "primary");
        assert_eq!(fields["outcome"], "mock_hit");
    }

    #[test]
    fn test_credentials_and_configured_headers_are_masked() {
        let masked = MaskedHeaders::new(["X-Tenant-Token"]);
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("x-tenant-token", HeaderValue::from_static("t0ken"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let rendered = format!("{:?}", masked.render(&headers));

        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("t0ken"));
        assert!(rendered.contains("application/json"));
        assert!(masked.is_masked("X-TENANT-TOKEN"));
        assert!(!masked.is_masked("accept"));
    }

    #[test]
    fn test_long_and_binary_values_are_shortened() {
        let masked = MaskedHeaders::default();
        let mut headers = HeaderMap::new();
        let long = "v".repeat(HEADER_VALUE_LIMIT + 4);
        headers.insert("x-long", HeaderValue::from_str(&long).unwrap());
        headers.insert("x-bin", HeaderValue::from_bytes(&[0xc3, 0x28]).unwrap());

        let rendered = format!("{:?}", masked.render(&headers));

        assert!(rendered.contains("[+4 bytes]"));
        assert!(rendered.contains("[2 non-text bytes]"));
    }

    #[test]
    fn test_header_dump_is_capped() {
        let masked = MaskedHeaders::default();
        let mut headers = HeaderMap::new();
        for i in 0..HEADER_DUMP_LIMIT + 2 {
            let name = http::HeaderName::from_bytes(format!("x-n{i}").as_bytes()).unwrap();
            headers.insert(name, HeaderValue::from_static("1"));
        }

        let rendered = format!("{:?}", masked.render(&headers));
        assert!(rendered.contains("\"omitted\": 2"));
    }

    #[test]
    fn test_generated_request_ids_share_tag() {
        let first = next_request_id();
        let second = next_request_id();
        assert_ne!(first, second);
        assert_eq!(first.split_once('-').map(|p| p.0), second.split_once('-').map(|p| p.0));
    }
}
