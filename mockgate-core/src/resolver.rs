//! Resolution Engine.
//!
//! Layers are scanned in the order given and entries in declaration order;
//! the first match wins. There is no specificity ranking and no caching.

use std::sync::Arc;

use http::Method;

use crate::fixture::{FixtureStore, FixtureValue, Layer, LayerKind, Route};
use crate::matcher::PathParams;
use crate::request::MockRequest;

/// The route selected for a request, pinned to the layer snapshot it came from.
#[derive(Debug, Clone)]
pub struct Resolution {
    layer: Arc<Layer>,
    index: usize,
    params: PathParams,
}

impl Resolution {
    pub fn route(&self) -> &Route {
        &self.layer.routes()[self.index]
    }

    pub fn value(&self) -> &FixtureValue {
        self.route().value()
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn layer_kind(&self) -> LayerKind {
        self.layer.kind()
    }

    pub fn key(&self) -> &str {
        self.route().key()
    }
}

/// First match of `method` + `path` across `layers`.
pub fn resolve(method: &Method, path: &str, layers: &[Arc<Layer>]) -> Option<Resolution> {
    layers.iter().find_map(|layer| {
        layer.find(method, path).map(|(index, params)| Resolution {
            layer: Arc::clone(layer),
            index,
            params,
        })
    })
}

pub fn resolve_request(request: &MockRequest, layers: &[Arc<Layer>]) -> Option<Resolution> {
    resolve(request.method(), request.path(), layers)
}

/// Resolves against a fixed set of store layers.
#[derive(Debug, Clone)]
pub struct Resolver {
    store: Arc<FixtureStore>,
    order: Vec<LayerKind>,
}

impl Resolver {
    pub fn new(store: Arc<FixtureStore>, order: Vec<LayerKind>) -> Self {
        Self { store, order }
    }

    pub fn order(&self) -> &[LayerKind] {
        &self.order
    }

    /// Take one snapshot of the configured layers and resolve against it.
    pub fn resolve(&self, request: &MockRequest) -> Option<Resolution> {
        let layers = self.store.snapshot(&self.order);
        resolve_request(request, &layers)
    }
}
