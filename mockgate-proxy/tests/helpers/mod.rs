//! Test helpers for mockgate integration tests.
//!
//! - an in-process mockgate server on an ephemeral port
//! - an axum fake upstream that echoes what it receives

#![allow(dead_code)]
#![allow(unused_imports)] // Re-exports may not be used by all test files

pub mod fake_upstream;
pub mod test_server;

pub use fake_upstream::*;
pub use test_server::*;
