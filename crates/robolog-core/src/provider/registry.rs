//! Path-keyed registries
//!
//! Consumers register overlays (3D points, trajectories, arrows) under a
//! key of their choice; the provider resolves every registered path at the
//! current index. Each registry has its own lock.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::lock;
use crate::store::SignalPath;

/// One registered overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    /// Signal path relative to the data root
    pub path: SignalPath,
    /// Opaque color passed through to the renderer
    pub color: Option<String>,
}

impl Overlay {
    /// Overlay on `path`, optionally colored
    pub fn new(path: SignalPath, color: Option<String>) -> Self {
        Self { path, color }
    }
}

/// Key → overlay map guarded by its own lock
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    name: &'static str,
    entries: Mutex<BTreeMap<String, Overlay>>,
}

impl OverlayRegistry {
    /// Empty registry; `name` appears in log messages
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register or replace the overlay stored under `key`
    pub fn register(&self, key: impl Into<String>, path: SignalPath, color: Option<String>) {
        let key = key.into();
        debug!("Registering {} '{}' -> {:?}", self.name, key, path);
        lock(&self.entries).insert(key, Overlay::new(path, color));
    }

    /// Remove `key`. Removing an unknown key does nothing.
    pub fn unregister(&self, key: &str) -> Option<Overlay> {
        let removed = lock(&self.entries).remove(key);
        if removed.is_some() {
            debug!("Unregistered {} '{}'", self.name, key);
        }
        removed
    }

    /// Overlay registered under `key`
    pub fn get(&self, key: &str) -> Option<Overlay> {
        lock(&self.entries).get(key).cloned()
    }

    /// True when `key` is registered
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Copy of all entries, ordered by key. Resolution runs on the copy so
    /// the registry lock is never held while reading signals.
    pub fn snapshot(&self) -> Vec<(String, Overlay)> {
        lock(&self.entries)
            .iter()
            .map(|(key, overlay)| (key.clone(), overlay.clone()))
            .collect()
    }

    /// Key → path map, for saving view snapshots
    pub fn export(&self) -> BTreeMap<String, SignalPath> {
        lock(&self.entries)
            .iter()
            .map(|(key, overlay)| (key.clone(), overlay.path.clone()))
            .collect()
    }

    /// Number of overlays
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// True when no overlay is registered
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Remove every overlay
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// Paths used to build the robot state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotStatePath {
    /// Joint positions; the configured default path is used when unset
    pub joints: Option<SignalPath>,
    /// Base position; zero when unset
    pub base_position: Option<SignalPath>,
    /// Base orientation (RPY or XYZW quaternion); identity when unset
    pub base_orientation: Option<SignalPath>,
}

/// How arrow vectors are scaled before rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum ArrowScaling {
    /// Divide by the largest vector norm found in the arrow's signal
    #[default]
    Auto,
    /// Divide by a user supplied maximum
    CustomMax(f64),
}

impl ArrowScaling {
    /// Divisor applied to a vector, given the largest norm in its signal.
    /// `None` means the vector is left as is.
    pub fn divisor(&self, max_norm: f64) -> Option<f64> {
        let divisor = match *self {
            ArrowScaling::Auto => max_norm,
            ArrowScaling::CustomMax(value) => value,
        };
        (divisor.is_finite() && divisor > 0.0).then_some(divisor)
    }
}
