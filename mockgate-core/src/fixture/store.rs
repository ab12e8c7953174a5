//! Layer ownership and atomic replacement.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use super::loader::load_layer;
use super::{Layer, LayerKind};
use crate::config::Settings;
use crate::handler::HandlerRegistry;

struct LayerSlot {
    directory: PathBuf,
    current: ArcSwap<Layer>,
}

impl LayerSlot {
    fn open(kind: LayerKind, directory: PathBuf, registry: &HandlerRegistry) -> Self {
        let layer = load_layer(kind, &directory, registry);
        info!(
            layer = %kind,
            directory = %directory.display(),
            routes = layer.len(),
            "Fixtures loaded"
        );
        Self {
            current: ArcSwap::from_pointee(layer),
            directory,
        }
    }
}

/// Holds the primary and fallback layers.
///
/// Readers take an `Arc<Layer>` snapshot and keep it for the whole request;
/// a reload builds a complete new layer off to the side and swaps the pointer,
/// so a reader sees either the old layer or the new one, never a mix.
pub struct FixtureStore {
    primary: LayerSlot,
    fallback: LayerSlot,
    registry: Arc<HandlerRegistry>,
}

impl FixtureStore {
    /// Scan both directories and build the initial layers.
    pub fn open(
        primary_dir: impl Into<PathBuf>,
        fallback_dir: impl Into<PathBuf>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            primary: LayerSlot::open(LayerKind::Primary, primary_dir.into(), &registry),
            fallback: LayerSlot::open(LayerKind::Fallback, fallback_dir.into(), &registry),
            registry,
        }
    }

    pub fn from_settings(settings: &Settings, registry: Arc<HandlerRegistry>) -> Self {
        Self::open(settings.primary_dir(), settings.fallback_dir(), registry)
    }

    fn slot(&self, kind: LayerKind) -> &LayerSlot {
        match kind {
            LayerKind::Primary => &self.primary,
            LayerKind::Fallback => &self.fallback,
        }
    }

    /// Current layer of the given kind.
    pub fn layer(&self, kind: LayerKind) -> Arc<Layer> {
        self.slot(kind).current.load_full()
    }

    pub fn directory(&self, kind: LayerKind) -> &Path {
        &self.slot(kind).directory
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Snapshot the given layers, in the given order.
    pub fn snapshot(&self, kinds: &[LayerKind]) -> Vec<Arc<Layer>> {
        kinds.iter().map(|kind| self.layer(*kind)).collect()
    }

    /// Rebuild a layer from its directory and swap it in.
    pub fn reload(&self, kind: LayerKind) -> Arc<Layer> {
        let slot = self.slot(kind);
        let layer = Arc::new(load_layer(kind, &slot.directory, &self.registry));
        slot.current.store(Arc::clone(&layer));
        info!(
            layer = %kind,
            directory = %slot.directory.display(),
            routes = layer.len(),
            "Fixtures reloaded"
        );
        layer
    }
}

impl std::fmt::Debug for FixtureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureStore")
            .field("primary", &self.primary.directory)
            .field("fallback", &self.fallback.directory)
            .finish()
    }
}
