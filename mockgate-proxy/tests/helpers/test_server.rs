//! In-process mockgate server bound to `127.0.0.1:0`.

use mockgate_core::config::Settings;
use mockgate_core::fixture::{FixtureStore, FixtureWatcher};
use mockgate_proxy::app::App;
use mockgate_proxy::logging_layer::logging_layer;
use mockgate_proxy::server::{DEFAULT_DRAIN_TIMEOUT, DrainResult, serve};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;

pub struct TestServer {
    pub addr: SocketAddr,
    pub settings: Settings,
    pub store: Arc<FixtureStore>,
    shutdown: CancellationToken,
    handle: JoinHandle<DrainResult>,
    _watchers: Vec<FixtureWatcher>,
}

impl TestServer {
    pub async fn start(settings: Settings) -> Self {
        Self::start_inner(settings, false).await
    }

    /// Like [`TestServer::start`], with hot reload on both layers.
    pub async fn start_watching(settings: Settings) -> Self {
        Self::start_inner(settings, true).await
    }

    async fn start_inner(settings: Settings, watch: bool) -> Self {
        let App {
            store,
            service,
            watchers,
        } = App::build(&settings, watch).unwrap();
        let stack = ServiceBuilder::new()
            .layer(logging_layer(settings.headers.keys()))
            .service(service);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(
            listener,
            stack,
            shutdown.clone(),
            DEFAULT_DRAIN_TIMEOUT,
        ));

        Self {
            addr,
            settings,
            store,
            shutdown,
            handle,
            _watchers: watchers,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) -> DrainResult {
        self.shutdown.cancel();
        self.handle.await.unwrap()
    }
}

pub fn mock_settings(mock_path: &Path) -> Settings {
    Settings {
        mock_path: mock_path.to_path_buf(),
        ..Default::default()
    }
}

pub fn proxy_settings(mock_path: &Path, upstream: &str) -> Settings {
    Settings {
        mock_path: mock_path.to_path_buf(),
        listen: Some(upstream.to_string()),
        upstream_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `check` every 25ms until it returns true, for at most 5 seconds.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}
