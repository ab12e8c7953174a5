//! Permissive CORS headers, added to every response.

use http::HeaderMap;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, HeaderValue, ORIGIN,
};

pub const ALLOW_METHODS: &str = "PUT, POST, GET, DELETE, OPTIONS";
pub const DEFAULT_ALLOW_HEADERS: &str = "Content-Type";

/// Write the CORS response headers for a request.
///
/// The caller's `Origin` is reflected (and omitted when absent), credentials
/// are allowed, and the allowed headers echo `Access-Control-Request-Headers`
/// when the preflight sends one.
pub fn apply_cors(request: &HeaderMap, response: &mut HeaderMap) {
    if let Some(origin) = request.get(ORIGIN) {
        response.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }
    response.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    response.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );

    let allow_headers = request
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOW_HEADERS));
    response.insert(ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
}
