//! mockgate - HTTP mock server and capturing proxy for API development.
//!
//! Without `listen` it serves fixtures from `mockPath`. With `listen` it
//! forwards every request to that upstream, records unmatched responses into
//! the capture directory and lets primary fixtures override live answers.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use mockgate_core::config::{Mode, Settings};
use mockgate_proxy::app::App;
use mockgate_proxy::cli::Cli;
use mockgate_proxy::logging_layer::logging_layer;
use mockgate_proxy::server::{DEFAULT_DRAIN_TIMEOUT, DrainResult, serve};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The guard must live until exit so buffered log lines are flushed.
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let overrides = Cli::parse().into_overrides();
    let settings = Settings::load(&overrides);

    let app = match App::build(&settings, true) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Failed to initialise request handling");
            return Err(e.into());
        }
    };

    let listener = TcpListener::bind(settings.bind_addr()).await?;
    match settings.mode() {
        Mode::Mock => info!(
            addr = %listener.local_addr()?,
            mock_path = %settings.primary_dir().display(),
            use_temp_mock = settings.use_temp_mock,
            "Mock server listening"
        ),
        Mode::Listen { upstream } => info!(
            addr = %listener.local_addr()?,
            upstream = %upstream,
            capture_dir = %settings.fallback_dir().display(),
            offline_replay = settings.use_temp_mock,
            "Capturing proxy listening"
        ),
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let service_stack = ServiceBuilder::new()
        .layer(logging_layer(settings.headers.keys()))
        .service(app.service.clone());

    match serve(listener, service_stack, shutdown, DEFAULT_DRAIN_TIMEOUT).await {
        DrainResult::Complete => {
            info!("All connections drained, shutting down cleanly");
            Ok(())
        }
        DrainResult::Timeout { remaining } => {
            Err(format!("Drain timeout exceeded with {remaining} open connections").into())
        }
    }
}

/// SIGINT and SIGTERM both begin a graceful shutdown.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                shutdown_sigint.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
                shutdown.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
            }
        }
    });

    #[cfg(not(unix))]
    let _ = shutdown;
}
