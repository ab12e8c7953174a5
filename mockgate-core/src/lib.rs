//! mockgate core: transport-agnostic fixture resolution and capture engine.
//!
//! This library provides everything the `mockgate` HTTP server needs apart from
//! the listener itself:
//!
//! - **Fixture store**: layers of route fixtures loaded from directories, hot
//!   reloaded on file-system changes (`fixture`).
//! - **Pattern matching**: `METHOD /path/:param` route keys (`matcher`).
//! - **Resolution**: first-match scan over ordered layers (`resolver`).
//! - **Realization**: static values and computable handlers rendered into
//!   responses (`realizer`, `handler`).
//! - **Capture**: live upstream responses persisted as fallback fixtures
//!   (`capture`, `transport`).
//! - **Configuration**: a single immutable [`config::Settings`] value built at
//!   startup (`config`).
//!
//! # Precedence
//!
//! Route keys are never ranked by specificity. The primary layer is scanned
//! before the fallback layer and, inside a layer, the first key that matches
//! wins. Fixture authors order specific routes before general ones.

pub mod capture;
pub mod config;
pub mod error;
pub mod fixture;
pub mod handler;
pub mod matcher;
pub mod realizer;
pub mod request;
pub mod resolver;
pub mod transport;

pub use request::{MockRequest, ResponseControl};
