//! Fixture layers.
//!
//! A layer is the ordered union of every visible fixture file in one
//! directory. It is immutable once built; the [`FixtureStore`] replaces it
//! wholesale on reload.

pub mod loader;
pub mod store;
pub mod watcher;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::handler::FixtureHandler;
use crate::matcher::{PathParams, PatternError, RouteMatcher};

pub use loader::{is_visible_fixture, load_layer};
pub use store::FixtureStore;
pub use watcher::{FixtureWatcher, WatchError};

/// Object key that marks a computable fixture value.
pub const HANDLER_MARKER: &str = "$handler";

/// Which of the two layers a fixture lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Hand-authored fixtures in `mockPath`.
    Primary,
    /// Fixtures captured from live upstream traffic.
    Fallback,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixture value, classified when the layer is built.
#[derive(Clone)]
pub enum FixtureValue {
    Static(Value),
    Computable(Arc<dyn FixtureHandler>),
}

impl FixtureValue {
    pub fn is_computable(&self) -> bool {
        matches!(self, Self::Computable(_))
    }

    pub fn as_static(&self) -> Option<&Value> {
        match self {
            Self::Static(value) => Some(value),
            Self::Computable(_) => None,
        }
    }
}

impl fmt::Debug for FixtureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Computable(handler) => f.debug_tuple("Computable").field(&handler.name()).finish(),
        }
    }
}

/// One compiled entry of a layer.
#[derive(Debug, Clone)]
pub struct Route {
    matcher: RouteMatcher,
    value: FixtureValue,
    source: PathBuf,
}

impl Route {
    pub fn new(matcher: RouteMatcher, value: FixtureValue, source: impl Into<PathBuf>) -> Self {
        Self {
            matcher,
            value,
            source: source.into(),
        }
    }

    pub fn key(&self) -> &str {
        self.matcher.key()
    }

    pub fn matcher(&self) -> &RouteMatcher {
        &self.matcher
    }

    pub fn value(&self) -> &FixtureValue {
        &self.value
    }

    /// File the entry was last defined in.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// An immutable, ordered set of routes loaded from one directory.
#[derive(Debug, Clone)]
pub struct Layer {
    kind: LayerKind,
    directory: PathBuf,
    routes: Vec<Route>,
}

impl Layer {
    pub fn new(kind: LayerKind, directory: impl Into<PathBuf>, routes: Vec<Route>) -> Self {
        Self {
            kind,
            directory: directory.into(),
            routes,
        }
    }

    pub fn empty(kind: LayerKind, directory: impl Into<PathBuf>) -> Self {
        Self::new(kind, directory, Vec::new())
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Look up an entry by its exact route key.
    pub fn get(&self, key: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.key() == key)
    }

    /// First route matching `method` and `path`, in declaration order.
    pub fn find(&self, method: &http::Method, path: &str) -> Option<(usize, PathParams)> {
        self.routes
            .iter()
            .enumerate()
            .find_map(|(index, route)| route.matcher.matches(method, path).map(|p| (index, p)))
    }
}

/// Problems met while building a layer. None of them aborts the load: a
/// directory error yields an empty layer and an entry error skips that entry.
#[derive(Debug, Error)]
pub enum FixtureLoadError {
    #[error("fixture directory not found: {path}")]
    DirectoryMissing { path: PathBuf },

    #[error("failed to read fixture directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read fixture file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse fixture file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("fixture file {path} must contain a top-level mapping")]
    NotAMapping { path: PathBuf },

    #[error("invalid route key '{key}' in {path}: {source}")]
    InvalidKey {
        path: PathBuf,
        key: String,
        #[source]
        source: PatternError,
    },

    #[error("invalid handler for '{key}' in {path}: {message}")]
    InvalidHandler {
        path: PathBuf,
        key: String,
        message: String,
    },

    #[error("unknown handler '{name}' for '{key}' in {path}")]
    UnknownHandler {
        path: PathBuf,
        key: String,
        name: String,
    },
}
