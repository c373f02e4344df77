//! Signal providers
//!
//! A provider owns a dataset (a recorded archive or a live feed), the
//! playback index into it, and the overlay registries. Two variants share
//! the [`SignalProvider`] interface:
//!
//! - [`OfflineSignalProvider`] replays an archive; the index is a seekable
//!   cursor advanced by the playback clock.
//! - [`RealtimeSignalProvider`] ingests frames from a [`VectorsClient`] into
//!   a sliding window; the index always points at the latest sample.
//!
//! Signal paths are relative to the dataset root group, e.g.
//! `["joints_state", "positions"]`.
//!
//! [`VectorsClient`]: crate::transport::VectorsClient

mod clock;
mod error;
mod offline;
mod realtime;
mod registry;
pub mod rotation;

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::store::{fit_vector, join_path, pad_columns, SignalPath};

pub use clock::{Notifier, PeriodicThread, PlaybackState, StateCell, Tick};
pub use error::ProviderError;
pub use offline::OfflineSignalProvider;
pub use realtime::RealtimeSignalProvider;
pub use registry::{ArrowScaling, Overlay, OverlayRegistry, RobotStatePath};

/// Which variant a provider is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Replays a loaded archive
    Offline,
    /// Tails a live logger
    Realtime,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Offline => write!(f, "offline"),
            ProviderKind::Realtime => write!(f, "realtime"),
        }
    }
}

/// Robot configuration at one instant, ready for a kinematic viewer
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    /// Joint positions, ordered as `joints_name`
    pub joints_position: DVector<f64>,
    /// Base position in the world frame
    pub base_position: Vector3<f64>,
    /// Base orientation as a rotation matrix
    pub base_orientation: Matrix3<f64>,
}

/// A 3D arrow: where it starts and where it points (already scaled)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrow {
    /// Arrow tail
    pub origin: Vector3<f64>,
    /// Arrow direction and length, already scaled
    pub vector: Vector3<f64>,
}

/// Result of resolving every entry of a registry
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayQuery<T> {
    /// Key → value for entries whose path resolved
    pub resolved: Vec<(String, T)>,
    /// Keys whose path no longer resolves
    pub missing: Vec<String>,
}

impl<T> Default for OverlayQuery<T> {
    fn default() -> Self {
        Self {
            resolved: Vec::new(),
            missing: Vec::new(),
        }
    }
}

impl<T> OverlayQuery<T> {
    /// Value of the overlay registered under `key`
    pub fn get(&self, key: &str) -> Option<&T> {
        self.resolved.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// True when nothing was returned or failed
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.missing.is_empty()
    }
}

/// Registries shared by both provider variants
#[derive(Debug)]
pub struct Overlays {
    /// Registered 3D points
    pub points: OverlayRegistry,
    /// Registered 3D trajectories
    pub trajectories: OverlayRegistry,
    /// Registered 3D arrows
    pub arrows: OverlayRegistry,
    robot_state_path: Mutex<RobotStatePath>,
    arrow_scaling: Mutex<ArrowScaling>,
}

impl Default for Overlays {
    fn default() -> Self {
        Self {
            points: OverlayRegistry::new("3D point"),
            trajectories: OverlayRegistry::new("3D trajectory"),
            arrows: OverlayRegistry::new("3D arrow"),
            robot_state_path: Mutex::new(RobotStatePath::default()),
            arrow_scaling: Mutex::new(ArrowScaling::default()),
        }
    }
}

impl Overlays {
    /// Current robot state path
    pub fn robot_state_path(&self) -> RobotStatePath {
        lock(&self.robot_state_path).clone()
    }

    /// Replace the robot state path
    pub fn set_robot_state_path(&self, path: RobotStatePath) {
        *lock(&self.robot_state_path) = path;
    }

    /// Current arrow scaling
    pub fn arrow_scaling(&self) -> ArrowScaling {
        *lock(&self.arrow_scaling)
    }

    /// Replace the arrow scaling
    pub fn set_arrow_scaling(&self, scaling: ArrowScaling) {
        *lock(&self.arrow_scaling) = scaling;
    }

    /// Drop every registration, e.g. when a new dataset is loaded
    pub fn clear(&self) {
        self.points.clear();
        self.trajectories.clear();
        self.arrows.clear();
        self.set_robot_state_path(RobotStatePath::default());
    }
}

/// Common interface of the offline and realtime providers
pub trait SignalProvider: Send + Sync {
    /// Load an archive (offline) or connect to a logger (realtime)
    fn open(&self, source: &str) -> Result<(), ProviderError>;

    /// Offline or realtime
    fn provider_kind(&self) -> ProviderKind;

    /// Configuration the provider was created with
    fn config(&self) -> &ProviderConfig;

    /// Current playback state
    fn state(&self) -> PlaybackState;

    /// Returns false if the provider is already closed
    fn set_state(&self, state: PlaybackState) -> bool;

    /// Number of samples in the reference timeline
    fn len(&self) -> usize;

    /// True when the timeline holds no sample
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current index into the reference timeline
    fn index(&self) -> usize;

    /// Seconds since `initial_time`
    fn current_time(&self) -> f64;

    /// First reference timestamp
    fn initial_time(&self) -> f64;

    /// Last reference timestamp
    fn end_time(&self) -> f64;

    /// Reference timestamps (a copy)
    fn timestamps(&self) -> Vec<f64>;

    /// Seek. Out-of-range values are clamped.
    fn update_index(&self, index: i64);

    /// Seek to a fraction of the dataset (`0.0..=1.0`)
    fn set_dataset_percentage(&self, percentage: f64);

    /// Ordered joint names
    fn joints_name(&self) -> Vec<String>;

    /// Robot display name
    fn robot_name(&self) -> String;

    /// Every numeric signal path, relative to the root
    fn signal_paths(&self) -> Vec<SignalPath>;

    /// Per-column labels of a signal (positional names when none were stored)
    fn elements_names(&self, path: &[String]) -> Result<Vec<String>, ProviderError>;

    /// Row (`neighbor == 0`) or rows around the sample of `path` closest to
    /// reference sample `index`. An empty `path` falls back to `default_path`.
    fn get_item_from_path_at_index(
        &self,
        path: &[String],
        index: usize,
        default_path: Option<&[String]>,
        neighbor: usize,
    ) -> Result<DMatrix<f64>, ProviderError>;

    /// Largest arrow vector norm (columns 3..6) found in `path`
    fn arrow_max_norm(&self, path: &[String]) -> Result<f64, ProviderError>;

    /// Overlay registries and robot state path
    fn overlays(&self) -> &Overlays;

    /// Subscribe to index updates. Callbacks run on the playback thread.
    fn register_update_index(&self, callback: Box<dyn Fn(usize) + Send + Sync>);

    /// Drop every index callback
    fn clear_update_index_callbacks(&self);

    /// Spawn the playback thread
    fn start(&self) -> Result<(), ProviderError>;

    /// Stop the playback thread and wait for it
    fn close(&self);

    /// Row of `path` at the current index
    fn get_item_from_path(&self, path: &[String], default_path: Option<&[String]>) -> Result<DVector<f64>, ProviderError> {
        let item = self.get_item_from_path_at_index(path, self.index(), default_path, 0)?;
        first_row(item, path)
    }

    /// Joint positions and base pose at reference sample `index`.
    ///
    /// Unset base paths, or base signals with no samples yet, yield the
    /// identity pose
    fn get_robot_state_at_index(&self, index: usize) -> Result<RobotState, ProviderError> {
        let paths = self.overlays().robot_state_path();
        let default_joints = &self.config().joints_default_path;

        let joints = paths.joints.as_deref().unwrap_or_default();
        let joints_position = first_row(
            self.get_item_from_path_at_index(joints, index, Some(default_joints.as_slice()), 0)?,
            joints,
        )?;

        let base_position = match pose_row(self, paths.base_position.as_deref(), index)? {
            Some((path, row)) => {
                if row.len() != 3 {
                    return Err(ProviderError::InvalidShape {
                        path: join_path(path),
                        message: format!("base position has {} components, expected 3", row.len()),
                    });
                }
                Vector3::new(row[0], row[1], row[2])
            }
            None => Vector3::zeros(),
        };

        let base_orientation = match pose_row(self, paths.base_orientation.as_deref(), index)? {
            Some((path, row)) => {
                rotation::orientation_to_matrix(row.as_slice()).ok_or_else(|| ProviderError::InvalidShape {
                    path: join_path(path),
                    message: format!("orientation has {} components, expected 3 (RPY) or 4 (XYZW)", row.len()),
                })?
            }
            None => Matrix3::identity(),
        };

        Ok(RobotState {
            joints_position,
            base_position,
            base_orientation,
        })
    }

    /// Every registered point at `index`; 2D points get z = 0
    fn get_3d_point_at_index(&self, index: usize) -> OverlayQuery<Vector3<f64>> {
        query_registry(&self.overlays().points, |overlay| point_at(self, &overlay.path, index))
    }

    /// Point registered under `key` at `index`
    fn get_3d_point(&self, key: &str, index: usize) -> Result<Vector3<f64>, ProviderError> {
        let overlay = self
            .overlays()
            .points
            .get(key)
            .ok_or_else(|| ProviderError::NotRegistered(key.to_string()))?;
        point_at(self, &overlay.path, index)
    }

    /// Every registered trajectory at `index`, as `n x 3` matrices covering
    /// `trajectory_span` samples on each side
    fn get_3d_trajectory_at_index(&self, index: usize) -> OverlayQuery<DMatrix<f64>> {
        query_registry(&self.overlays().trajectories, |overlay| {
            trajectory_at(self, &overlay.path, index)
        })
    }

    /// Trajectory registered under `key` at `index`
    fn get_3d_trajectory(&self, key: &str, index: usize) -> Result<DMatrix<f64>, ProviderError> {
        let overlay = self
            .overlays()
            .trajectories
            .get(key)
            .ok_or_else(|| ProviderError::NotRegistered(key.to_string()))?;
        trajectory_at(self, &overlay.path, index)
    }

    /// Every registered arrow at `index`, scaled per [`ArrowScaling`]
    fn get_3d_arrow_at_index(&self, index: usize) -> OverlayQuery<Arrow> {
        query_registry(&self.overlays().arrows, |overlay| arrow_at(self, &overlay.path, index))
    }

    /// Arrow registered under `key` at `index`
    fn get_3d_arrow(&self, key: &str, index: usize) -> Result<Arrow, ProviderError> {
        let overlay = self
            .overlays()
            .arrows
            .get(key)
            .ok_or_else(|| ProviderError::NotRegistered(key.to_string()))?;
        arrow_at(self, &overlay.path, index)
    }

    /// Register a 3D point overlay, replacing any under `key`
    fn register_3d_point(&self, key: &str, path: SignalPath, color: Option<String>) {
        self.overlays().points.register(key, path, color);
    }

    /// Remove the point overlay under `key`
    fn unregister_3d_point(&self, key: &str) {
        self.overlays().points.unregister(key);
    }

    /// Register a 3D trajectory overlay, replacing any under `key`
    fn register_3d_trajectory(&self, key: &str, path: SignalPath, color: Option<String>) {
        self.overlays().trajectories.register(key, path, color);
    }

    /// Remove the trajectory overlay under `key`
    fn unregister_3d_trajectory(&self, key: &str) {
        self.overlays().trajectories.unregister(key);
    }

    /// Register a 3D arrow overlay, replacing any under `key`
    fn register_3d_arrow(&self, key: &str, path: SignalPath, color: Option<String>) {
        self.overlays().arrows.register(key, path, color);
    }

    /// Remove the arrow overlay under `key`
    fn unregister_3d_arrow(&self, key: &str) {
        self.overlays().arrows.unregister(key);
    }

    /// Snapshot of registered point paths
    fn export_registered_3d_points(&self) -> std::collections::BTreeMap<String, SignalPath> {
        self.overlays().points.export()
    }

    /// Snapshot of registered trajectory paths
    fn export_registered_3d_trajectories(&self) -> std::collections::BTreeMap<String, SignalPath> {
        self.overlays().trajectories.export()
    }

    /// Snapshot of registered arrow paths
    fn export_registered_3d_arrows(&self) -> std::collections::BTreeMap<String, SignalPath> {
        self.overlays().arrows.export()
    }

    /// `enabled`: divide arrow vectors by `value`; otherwise scale each
    /// arrow by its own largest norm
    fn set_custom_max_arrow(&self, enabled: bool, value: f64) {
        let scaling = if enabled {
            ArrowScaling::CustomMax(value)
        } else {
            ArrowScaling::Auto
        };
        self.overlays().set_arrow_scaling(scaling);
    }

    /// Paths feeding [`SignalProvider::get_robot_state_at_index`]
    fn robot_state_path(&self) -> RobotStatePath {
        self.overlays().robot_state_path()
    }

    /// Set the paths feeding the robot state
    fn set_robot_state_path(&self, path: RobotStatePath) {
        self.overlays().set_robot_state_path(path);
    }
}

fn point_at<P: SignalProvider + ?Sized>(provider: &P, path: &[String], index: usize) -> Result<Vector3<f64>, ProviderError> {
    let row = first_row(provider.get_item_from_path_at_index(path, index, None, 0)?, path)?;
    let xyz = fit_vector(&row, 3);
    Ok(Vector3::new(xyz[0], xyz[1], xyz[2]))
}

fn trajectory_at<P: SignalProvider + ?Sized>(
    provider: &P,
    path: &[String],
    index: usize,
) -> Result<DMatrix<f64>, ProviderError> {
    let span = provider.config().trajectory_span;
    let window = provider.get_item_from_path_at_index(path, index, None, span)?;
    let columns = window.ncols().min(3);
    Ok(pad_columns(window.columns(0, columns).into_owned(), 3))
}

fn arrow_at<P: SignalProvider + ?Sized>(provider: &P, path: &[String], index: usize) -> Result<Arrow, ProviderError> {
    let row = fit_vector(
        &first_row(provider.get_item_from_path_at_index(path, index, None, 0)?, path)?,
        6,
    );
    let origin = Vector3::new(row[0], row[1], row[2]);
    let mut vector = Vector3::new(row[3], row[4], row[5]);

    let scaling = provider.overlays().arrow_scaling();
    let max_norm = match scaling {
        ArrowScaling::Auto => provider.arrow_max_norm(path)?,
        ArrowScaling::CustomMax(_) => 0.0,
    };
    if let Some(divisor) = scaling.divisor(max_norm) {
        vector /= divisor;
    }
    Ok(Arrow { origin, vector })
}

/// Resolve every registry entry, splitting failures out as missing keys
fn query_registry<T, F>(registry: &OverlayRegistry, resolve: F) -> OverlayQuery<T>
where
    F: Fn(&Overlay) -> Result<T, ProviderError>,
{
    let mut query = OverlayQuery::default();
    for (key, overlay) in registry.snapshot() {
        match resolve(&overlay) {
            Ok(value) => query.resolved.push((key, value)),
            Err(e) => {
                debug!("Overlay '{}' unavailable: {}", key, e);
                query.missing.push(key);
            }
        }
    }
    query
}

/// Row of a configured base pose signal. `None` when no path is configured
/// or the signal has no samples yet, so the robot is drawn at the origin.
fn pose_row<'a, P: SignalProvider + ?Sized>(
    provider: &P,
    path: Option<&'a [String]>,
    index: usize,
) -> Result<Option<(&'a [String], DVector<f64>)>, ProviderError> {
    let Some(path) = path.filter(|path| !path.is_empty()) else {
        return Ok(None);
    };
    match provider.get_item_from_path_at_index(path, index, None, 0) {
        Ok(item) => Ok(Some((path, first_row(item, path)?))),
        Err(ProviderError::NoData(_)) => {
            debug!("No samples for '{}' yet, using the default pose", join_path(path));
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn first_row(item: DMatrix<f64>, path: &[String]) -> Result<DVector<f64>, ProviderError> {
    if item.nrows() == 0 {
        return Err(ProviderError::NoData(join_path(path)));
    }
    Ok(item.row(0).transpose())
}

/// Largest norm of the arrow vectors (columns 3..6, zero padded) in `data`
pub(crate) fn max_arrow_norm(data: &DMatrix<f64>) -> f64 {
    if data.ncols() <= 3 {
        return 0.0;
    }
    let columns = (data.ncols() - 3).min(3);
    data.columns(3, columns)
        .row_iter()
        .map(|row| row.norm())
        .fold(0.0, f64::max)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
