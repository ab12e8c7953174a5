//! Capture: live upstream responses persisted as fallback fixtures.
//!
//! Every capture is a single JSON document `{"METHOD PATH": <body>}` stored in
//! its own file, named after the request signature so that repeated captures
//! of the same signature overwrite each other and different signatures never
//! share a file.

pub mod pipeline;
pub mod writer;

use std::io;
use std::path::PathBuf;

use http::Method;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::{Map, Value};
use thiserror::Error;

pub use pipeline::{CaptureOutcome, CapturePipeline, PipelineReply};
pub use writer::{CaptureWriter, PendingCapture};

use crate::matcher::is_method_token;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to create capture directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write capture file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode capture for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Fixture key recorded for a captured request: `METHOD PATH`.
pub fn capture_key(method: &Method, path: &str) -> String {
    format!("{method} {path}")
}

/// Bytes escaped in capture file names. `.` and `_` are escaped so that a
/// literal dot cannot be confused with a path separator and no name starts
/// hidden; the rest are unsafe in file names on common platforms.
const FILE_NAME_ESCAPES: &AsciiSet = &CONTROLS
    .add(b'%')
    .add(b'.')
    .add(b'_')
    .add(b'\\')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|');

/// File name for a capture.
///
/// The path after its leading `/` is percent-escaped and its remaining `/`
/// become `.`. The root path is `index`. A stem that would start with `.`
/// gets `%2F` for that separator and a non-root `index` gets its first
/// letter escaped. When the stem itself ends in `-METHOD` that `-` becomes
/// `%2D`. Non-GET methods add a `-METHOD` suffix and the extension is
/// `.json`.
///
/// Distinct `(method, path)` pairs always get distinct names, so one
/// capture never overwrites another signature's file.
///
/// Examples: `GET /api/users` → `api.users.json`,
/// `POST /api/users` → `api.users-POST.json`, `GET /a.b` → `a%2Eb.json`,
/// `GET /` → `index.json`.
pub fn capture_file_name(method: &Method, path: &str) -> String {
    let stem = file_stem(path);
    if *method == Method::GET {
        format!("{stem}.json")
    } else {
        format!("{stem}-{method}.json")
    }
}

fn file_stem(path: &str) -> String {
    let relative = path.strip_prefix('/').unwrap_or(path);
    if relative.is_empty() {
        return "index".to_string();
    }

    let mut stem = utf8_percent_encode(relative, FILE_NAME_ESCAPES)
        .to_string()
        .replace('/', ".");

    if stem.starts_with('.') {
        stem.replace_range(..1, "%2F");
    } else if stem.eq_ignore_ascii_case("index") {
        let escaped = format!("%{:02X}", stem.as_bytes()[0]);
        stem.replace_range(..1, &escaped);
    }

    if let Some((head, tail)) = stem.rsplit_once('-')
        && is_method_token(tail)
    {
        stem = format!("{head}%2D{tail}");
    }

    stem
}

/// Captured body as a fixture value: parsed JSON when the body is JSON,
/// otherwise the (lossily decoded) text as a JSON string.
///
/// A body that is itself a JSON string, such as `"ok"`, is stored as that
/// string and therefore replays as `text/plain` `ok`, like any text body.
pub fn capture_value(body: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) if !body.is_empty() => value,
        _ => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

/// The on-disk capture document for one signature.
pub fn capture_document(key: &str, body: &[u8]) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), capture_value(body));
    Value::Object(map)
}
