//! Route key compilation and path matching.
//!
//! A route key is either `METHOD PATH-PATTERN` or a bare `PATH-PATTERN`
//! (any method). Path patterns are `/`-separated segments:
//!
//! - literal segments match verbatim (case-sensitive)
//! - `:name` matches one non-empty segment and captures it under `name`
//! - `*` matches one non-empty segment and captures it positionally (`0`, `1`, ...)
//!
//! A single trailing slash on the pattern or the path is ignored. Matching is
//! always against the full path.

use std::collections::HashSet;
use std::fmt;

use http::Method;
use serde_json::{Map, Value};
use thiserror::Error;

/// Route key compilation errors. The offending entry is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("route key is empty")]
    EmptyKey,

    #[error("invalid HTTP method '{method}' in route key '{key}'")]
    InvalidMethod { key: String, method: String },

    #[error("path pattern '{pattern}' must start with '/'")]
    MissingLeadingSlash { pattern: String },

    #[error("empty parameter name in path pattern '{pattern}'")]
    EmptyParamName { pattern: String },

    #[error("duplicate parameter '{name}' in path pattern '{pattern}'")]
    DuplicateParam { pattern: String, name: String },
}

/// Values captured from the request path, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Captured values as a JSON object of strings.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.entries {
            map.insert(name.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }

    fn push(&mut self, name: String, value: &str) {
        self.entries.push((name, value.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(usize),
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash {
                pattern: pattern.to_string(),
            });
        }

        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        let mut wildcards = 0;

        for raw in split_segments(pattern) {
            let segment = if raw == "*" {
                wildcards += 1;
                Segment::Wildcard(wildcards - 1)
            } else if let Some(name) = raw.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParamName {
                        pattern: pattern.to_string(),
                    });
                }
                if !seen.insert(name.to_string()) {
                    return Err(PatternError::DuplicateParam {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(raw.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match the full path, returning captured parameters on success.
    pub fn captures(&self, path: &str) -> Option<PathParams> {
        if !path.starts_with('/') {
            return None;
        }

        let mut parts = split_segments(path).into_iter();
        let mut params = PathParams::new();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.push(name.clone(), part);
                }
                Segment::Wildcard(index) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.push(index.to_string(), part);
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }

    pub fn test(&self, path: &str) -> bool {
        self.captures(path).is_some()
    }
}

/// Segments after the leading slash, ignoring a single trailing slash.
/// `/` yields no segments.
fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// Methods accepted in route keys.
const KNOWN_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

fn parse_method(token: &str) -> Option<Method> {
    KNOWN_METHODS
        .iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(token))
        .cloned()
}

/// Whether a route key can name `method`. Extension methods such as
/// `PROPFIND` cannot be expressed as fixture keys.
pub fn is_known_method(method: &Method) -> bool {
    KNOWN_METHODS.contains(method)
}

/// Case-insensitive form of [`is_known_method`] for raw tokens.
pub fn is_method_token(token: &str) -> bool {
    parse_method(token).is_some()
}

/// A compiled route key: optional method plus path pattern.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    key: String,
    method: Option<Method>,
    pattern: PathPattern,
}

impl RouteMatcher {
    /// Compile a route key such as `GET /users/:id` or `/health`.
    pub fn compile(key: &str) -> Result<Self, PatternError> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(PatternError::EmptyKey);
        }

        let (method, path) = match trimmed.split_once(' ') {
            Some((method, rest)) => {
                let parsed = parse_method(method).ok_or_else(|| PatternError::InvalidMethod {
                    key: key.to_string(),
                    method: method.to_string(),
                })?;
                (Some(parsed), rest.trim())
            }
            None => (None, trimmed),
        };

        Ok(Self {
            key: key.to_string(),
            method,
            pattern: PathPattern::compile(path)?,
        })
    }

    /// The route key as written in the fixture file.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `None` for bare keys, which match any method.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if let Some(expected) = &self.method
            && expected != method
        {
            return None;
        }
        self.pattern.captures(path)
    }

    pub fn test(&self, method: &Method, path: &str) -> bool {
        self.matches(method, path).is_some()
    }
}

impl fmt::Display for RouteMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
