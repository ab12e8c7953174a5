//! Request and response-control types shared by the resolver, realizer and
//! capture pipeline.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::{Map, Value};

/// An inbound request, fully buffered.
///
/// The transport builds one of these per request; everything downstream
/// (resolution, handlers, upstream forwarding, capture naming) reads from it.
#[derive(Debug, Clone)]
pub struct MockRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl MockRequest {
    /// Create a request with an empty body and no headers.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Build a request from `http` request parts and an already-collected body.
    pub fn from_parts(parts: &http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            body,
        }
    }

    /// Set the raw query string (without the leading `?`).
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.is_empty() { None } else { Some(query) };
        self
    }

    /// Add a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Set the raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// `METHOD PATH`, the signature used to key captured fixtures.
    pub fn signature(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Decoded query parameters in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        match &self.query {
            Some(query) => url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Query parameters as a JSON object. Repeated names keep the last value.
    pub fn query_json(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in self.query_pairs() {
            map.insert(name, Value::String(value));
        }
        Value::Object(map)
    }

    /// Headers with UTF-8 values as a JSON object keyed by lowercase name.
    pub fn headers_json(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.headers {
            if let Ok(value) = value.to_str() {
                map.insert(name.as_str().to_string(), Value::String(value.to_string()));
            }
        }
        Value::Object(map)
    }

    /// The body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    /// The body as JSON when possible, otherwise as a UTF-8 string, otherwise null.
    pub fn body_json(&self) -> Value {
        if let Some(value) = self.json_body() {
            return value;
        }
        match std::str::from_utf8(&self.body) {
            Ok(text) if !text.is_empty() => Value::String(text.to_string()),
            _ => Value::Null,
        }
    }
}

/// Response-control handle passed to computable fixtures.
///
/// Handlers set the status code and headers here and return the body value
/// separately.
#[derive(Debug, Clone)]
pub struct ResponseControl {
    status: StatusCode,
    headers: HeaderMap,
}

impl Default for ResponseControl {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

impl ResponseControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Split into status and headers.
    pub fn into_parts(self) -> (StatusCode, HeaderMap) {
        (self.status, self.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_uses_path_without_query() {
        let req = MockRequest::new(Method::POST, "/api/users").with_query("page=2");
        assert_eq!(req.signature(), "POST /api/users");
        assert_eq!(req.query(), Some("page=2"));
    }

    #[test]
    fn test_query_pairs_are_decoded() {
        let req = MockRequest::new(Method::GET, "/search").with_query("q=hello%20world&tag=a&tag=b");
        assert_eq!(
            req.query_pairs(),
            vec![
                ("q".to_string(), "hello world".to_string()),
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
            ]
        );
        assert_eq!(req.query_json(), json!({"q": "hello world", "tag": "b"}));
    }

    #[test]
    fn test_empty_query_is_none() {
        let req = MockRequest::new(Method::GET, "/").with_query("");
        assert!(req.query().is_none());
        assert!(req.query_pairs().is_empty());
    }

    #[test]
    fn test_body_json_falls_back_to_text() {
        let json_req = MockRequest::new(Method::POST, "/").with_body(r#"{"a":1}"#);
        assert_eq!(json_req.body_json(), json!({"a": 1}));

        let text_req = MockRequest::new(Method::POST, "/").with_body("name=bob");
        assert_eq!(text_req.body_json(), json!("name=bob"));

        let empty = MockRequest::new(Method::GET, "/");
        assert_eq!(empty.body_json(), Value::Null);
    }

    #[test]
    fn test_headers_json_lowercases_names() {
        let req = MockRequest::new(Method::GET, "/").with_header("X-Token", "abc");
        assert_eq!(req.headers_json(), json!({"x-token": "abc"}));
    }

    #[test]
    fn test_from_parts() {
        let (parts, ()) = http::Request::builder()
            .method(Method::PUT)
            .uri("/items/7?dry=1")
            .header("content-type", "application/json")
            .body(())
            .expect("valid request")
            .into_parts();
        let req = MockRequest::from_parts(&parts, Bytes::from_static(b"{}"));
        assert_eq!(req.method(), Method::PUT);
        assert_eq!(req.path(), "/items/7");
        assert_eq!(req.query(), Some("dry=1"));
        assert_eq!(req.json_body(), Some(json!({})));
    }

    #[test]
    fn test_response_control_defaults() {
        let mut control = ResponseControl::new();
        assert_eq!(control.status(), StatusCode::OK);
        control.set_status(StatusCode::CREATED);
        control
            .headers_mut()
            .insert("x-mock", HeaderValue::from_static("1"));
        let (status, headers) = control.into_parts();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers.get("x-mock").map(|v| v.as_bytes()), Some(&b"1"[..]));
    }
}
