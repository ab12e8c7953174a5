//! On-disk configuration file schema (`.mock-server.yaml`).
//!
//! ```yaml
//! port: 3000
//! mockPath: ./mock
//! listen: http://localhost:8080
//! useTempMock: true
//! devHost: 0.0.0.0
//! headers:
//!   Authorization: Bearer ${API_TOKEN}
//! ```
//!
//! Every field is optional; unknown fields are ignored.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub port: Option<u16>,
    pub mock_path: Option<String>,
    /// Upstream base URL. Presence switches to proxy mode.
    pub listen: Option<String>,
    /// Extra headers added to every forwarded request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub use_temp_mock: Option<bool>,
    pub dev_host: Option<String>,
    /// Capture directory, relative to `mockPath` unless absolute.
    pub capture_dir: Option<String>,
    pub upstream_timeout_secs: Option<u64>,
    /// Maximum request and upstream response body size in bytes.
    pub max_body_size: Option<usize>,
}
