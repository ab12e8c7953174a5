//! Named handlers referenced from fixture files as `{"$handler": "name"}`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{FixtureHandler, HandlerError};
use crate::matcher::PathParams;
use crate::request::{MockRequest, ResponseControl};

/// Lookup table from handler name to implementation.
///
/// Library users register their own handlers before opening the fixture
/// store; the registry is read-only afterwards and shared by every reload.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn FixtureHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in handlers (`echo`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", Arc::new(EchoHandler));
        registry
    }

    /// Register a handler, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn FixtureHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FixtureHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

/// Returns what it received: method, path, params, query and body.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl FixtureHandler for EchoHandler {
    async fn call(
        &self,
        request: &MockRequest,
        params: &PathParams,
        _control: &mut ResponseControl,
    ) -> Result<Value, HandlerError> {
        Ok(json!({
            "method": request.method().as_str(),
            "path": request.path(),
            "params": params.to_json(),
            "query": request.query_json(),
            "body": request.body_json(),
        }))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
