//! Directory scan and fixture file parsing.
//!
//! Files are merged in lexical order of their names. On a key collision the
//! later file's value replaces the earlier one but the key keeps the position
//! where it was first seen, so the enumeration order of a layer only depends
//! on the directory contents.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{FixtureLoadError, FixtureValue, HANDLER_MARKER, Layer, LayerKind, Route};
use crate::handler::{HandlerRegistry, ScriptedHandler};
use crate::matcher::RouteMatcher;

const FIXTURE_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Whether `path` names a fixture file: a `.json`, `.yaml` or `.yml` file
/// whose name does not start with `_` or `.`.
pub fn is_visible_fixture(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('_') || name.starts_with('.') {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FIXTURE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Visible fixture files directly inside `directory`, sorted by file name.
pub fn scan_directory(directory: &Path) -> Result<Vec<PathBuf>, FixtureLoadError> {
    if !directory.is_dir() {
        return Err(FixtureLoadError::DirectoryMissing {
            path: directory.to_path_buf(),
        });
    }

    let entries = fs::read_dir(directory).map_err(|source| FixtureLoadError::ReadDir {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_visible_fixture(path))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Parse one fixture file into its ordered top-level mapping.
pub fn parse_fixture_file(path: &Path) -> Result<Map<String, Value>, FixtureLoadError> {
    let content = fs::read_to_string(path).map_err(|source| FixtureLoadError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let value: Value = if is_json {
        serde_json::from_str(&content).map_err(|e| FixtureLoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        serde_saphyr::from_str(&content).map_err(|e| FixtureLoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(FixtureLoadError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Classify a raw fixture value as static or computable.
pub fn build_value(
    path: &Path,
    key: &str,
    value: Value,
    registry: &HandlerRegistry,
) -> Result<FixtureValue, FixtureLoadError> {
    let spec = match &value {
        Value::Object(map) if map.len() == 1 => map.get(HANDLER_MARKER),
        _ => None,
    };

    let Some(spec) = spec else {
        return Ok(FixtureValue::Static(value));
    };

    match spec {
        Value::String(name) => registry
            .get(name)
            .map(FixtureValue::Computable)
            .ok_or_else(|| FixtureLoadError::UnknownHandler {
                path: path.to_path_buf(),
                key: key.to_string(),
                name: name.clone(),
            }),
        Value::Object(_) => ScriptedHandler::from_value(spec)
            .map(|handler| FixtureValue::Computable(std::sync::Arc::new(handler)))
            .map_err(|e| FixtureLoadError::InvalidHandler {
                path: path.to_path_buf(),
                key: key.to_string(),
                message: e.to_string(),
            }),
        _ => Err(FixtureLoadError::InvalidHandler {
            path: path.to_path_buf(),
            key: key.to_string(),
            message: format!("{HANDLER_MARKER} must be a handler name or an object"),
        }),
    }
}

/// Build a layer from `directory`.
///
/// Never fails: a missing or unreadable directory yields an empty layer and
/// invalid files or entries are skipped, each with a warning.
pub fn load_layer(kind: LayerKind, directory: &Path, registry: &HandlerRegistry) -> Layer {
    let files = match scan_directory(directory) {
        Ok(files) => files,
        Err(e) => {
            warn!(layer = %kind, directory = %directory.display(), error = %e, "Fixture directory unavailable, using empty layer");
            return Layer::empty(kind, directory);
        }
    };

    let mut merged = Map::new();
    let mut origins: HashMap<String, PathBuf> = HashMap::new();

    for file in &files {
        match parse_fixture_file(file) {
            Ok(map) => {
                debug!(layer = %kind, file = %file.display(), entries = map.len(), "Parsed fixture file");
                for (key, value) in map {
                    origins.insert(key.clone(), file.clone());
                    merged.insert(key, value);
                }
            }
            Err(e) => {
                warn!(layer = %kind, file = %file.display(), error = %e, "Skipping fixture file");
            }
        }
    }

    let mut routes = Vec::with_capacity(merged.len());
    for (key, value) in merged {
        let source = origins.remove(&key).unwrap_or_else(|| directory.to_path_buf());

        let matcher = match RouteMatcher::compile(&key) {
            Ok(matcher) => matcher,
            Err(source_err) => {
                let e = FixtureLoadError::InvalidKey {
                    path: source,
                    key,
                    source: source_err,
                };
                warn!(layer = %kind, error = %e, "Skipping fixture entry");
                continue;
            }
        };

        match build_value(&source, &key, value, registry) {
            Ok(value) => routes.push(Route::new(matcher, value, source)),
            Err(e) => warn!(layer = %kind, error = %e, "Skipping fixture entry"),
        }
    }

    Layer::new(kind, directory, routes)
}
