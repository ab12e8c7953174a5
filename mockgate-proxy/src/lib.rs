//! HTTP surface for mockgate.
//!
//! Wraps the `mockgate-core` engine in a hyper server: a tower service that
//! answers CORS preflights, serves fixtures in mock mode and drives the
//! capture pipeline in proxy mode, plus the tracing layer and accept loop
//! the `mockgate` binary is built from.

pub mod app;
pub mod cli;
pub mod cors;
pub mod error;
pub mod logging_layer;
pub mod mock_service;
pub mod server;
