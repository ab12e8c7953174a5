//! Outbound transport to the live API in proxy mode.

pub mod upstream;

pub use upstream::{
    Upstream, UpstreamClient, UpstreamConfig, UpstreamError, UpstreamResponse,
    merge_forward_headers,
};
