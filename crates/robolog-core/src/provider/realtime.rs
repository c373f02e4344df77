//! Realtime signal provider
//!
//! Ingests frames from a [`VectorsClient`] into a trailing time window. Only
//! the signals a consumer asked for are buffered; the primary joint position
//! signal is always buffered so the robot can be drawn.
//!
//! The stream-wide timestamp window and every signal buffer live behind the
//! index lock, so a tick's append and eviction are atomic for readers.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use nalgebra::DMatrix;
use tracing::{debug, info, warn};

use super::clock::{Notifier, PeriodicThread, PlaybackState, StateCell, Tick};
use super::{
    lock, max_arrow_norm, read, write, Overlays, ProviderError, ProviderKind, RobotStatePath, SignalProvider,
};
use crate::archive::{DESCRIPTION_LIST_KEY, ROBOT_NAME_KEY};
use crate::config::ProviderConfig;
use crate::store::{
    is_path_prefix, join_path, split_path, BufferedLeaf, BufferedTree, SignalPath, TimeWindow,
};
use crate::transport::{Frame, Metadata, VectorsClient};

/// Reserved segment carrying the stream timestamp
const TIMESTAMPS_SEGMENT: &str = "timestamps";

#[derive(Debug, Default)]
struct Session {
    opened: bool,
    joints_name: Vec<String>,
    robot_name: String,
}

/// Everything guarded by the index lock
#[derive(Debug)]
struct Buffers {
    timestamps: TimeWindow,
    tree: BufferedTree,
    index: usize,
    initial_time: f64,
    end_time: f64,
    current_time: f64,
}

impl Default for Buffers {
    fn default() -> Self {
        Self {
            timestamps: TimeWindow::new(),
            tree: BufferedTree::new(),
            index: 0,
            initial_time: 0.0,
            end_time: 0.0,
            current_time: 0.0,
        }
    }
}

/// Set of stream keys to buffer
#[derive(Debug, Clone, Default, PartialEq)]
struct Selection {
    entries: BTreeSet<SignalPath>,
}

impl Selection {
    /// A key is buffered when it lies under a selected entry, or when a
    /// selected entry lies under it
    fn matches(&self, key: &[String]) -> bool {
        self.entries
            .iter()
            .any(|entry| is_path_prefix(entry, key) || is_path_prefix(key, entry))
    }
}

struct RealtimeShared {
    config: ProviderConfig,
    state: StateCell,
    client: Mutex<Box<dyn VectorsClient>>,
    session: RwLock<Session>,
    buffers: Mutex<Buffers>,
    selection: RwLock<Selection>,
    overlays: Overlays,
    notifier: Notifier,
}

impl RealtimeShared {
    fn root(&self) -> &str {
        &self.config.signal_root_name
    }

    fn timestamps_key(&self) -> String {
        join_path(&[self.root(), TIMESTAMPS_SEGMENT])
    }

    /// Entry that is buffered whatever the consumers select
    fn always_selected(&self) -> SignalPath {
        let mut path = vec![self.root().to_string()];
        path.extend(self.config.joints_default_path.iter().cloned());
        path
    }

    fn is_reserved_metadata(&self, path: &[String]) -> bool {
        match path {
            [root, key] if root == self.root() => key == DESCRIPTION_LIST_KEY || key == ROBOT_NAME_KEY,
            _ => false,
        }
    }

    /// Empty buffers for every announced signal, labelled with its element names
    fn skeleton(&self, metadata: &Metadata) -> BufferedTree {
        let mut keys: Vec<&String> = metadata.keys().collect();
        keys.sort();

        let mut tree = BufferedTree::new();
        for key in keys {
            let names = &metadata[key];
            let path = split_path(key);
            if names.is_empty()
                || path.iter().any(|segment| segment == TIMESTAMPS_SEGMENT)
                || self.is_reserved_metadata(&path)
            {
                continue;
            }
            if let Err(e) = tree.upsert_leaf(&path, || BufferedLeaf::with_elements_names(names.clone())) {
                warn!("Ignoring metadata entry '{}': {}", key, e);
            }
        }
        tree
    }

    fn ingest(&self, frame: &Frame) {
        let timestamps_key = self.timestamps_key();
        let Some(&timestamp) = frame.get(&timestamps_key).and_then(|values| values.first()) else {
            warn!("Frame without '{}', skipping", timestamps_key);
            return;
        };
        let window = self.config.realtime_window_seconds;
        let selection = read(&self.selection).clone();

        let mut guard = lock(&self.buffers);
        let buffers = &mut *guard;
        let newest = buffers.timestamps.last();
        if !timestamp.is_finite() || newest.is_some_and(|newest| timestamp < newest) {
            warn!(
                "Out of order frame at {} (newest buffered {:?}), skipping",
                timestamp, newest
            );
            return;
        }
        buffers.timestamps.push(timestamp);
        buffers.timestamps.evict(timestamp, window);
        buffers.initial_time = buffers.timestamps.first().unwrap_or(timestamp);
        buffers.end_time = buffers.timestamps.last().unwrap_or(timestamp);

        for (key, value) in frame {
            if *key == timestamps_key {
                continue;
            }
            let path = split_path(key);
            if !selection.matches(&path) {
                continue;
            }
            match buffers.tree.upsert_leaf(&path, BufferedLeaf::new) {
                Ok(leaf) => leaf.push(value.clone(), timestamp),
                Err(e) => debug!("Not buffering '{}': {}", key, e),
            }
        }
        // Signals missing from this frame, or no longer selected, age out too
        buffers.tree.for_each_leaf_mut(|_, leaf| {
            leaf.evict(timestamp, window);
        });

        buffers.index = buffers.timestamps.len().saturating_sub(1);
        buffers.current_time = buffers.end_time - buffers.initial_time;
    }

    fn with_leaf<T>(
        &self,
        path: &[String],
        default_path: Option<&[String]>,
        f: impl FnOnce(&BufferedLeaf) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let path = match (path.is_empty(), default_path) {
            (true, Some(default_path)) => default_path,
            _ => path,
        };
        if path.is_empty() {
            return Err(ProviderError::PathNotFound(String::new()));
        }
        let mut full = Vec::with_capacity(path.len() + 1);
        full.push(self.root());
        full.extend(path.iter().map(String::as_str));

        let buffers = lock(&self.buffers);
        let leaf = buffers
            .tree
            .resolve(&full)
            .ok_or_else(|| ProviderError::PathNotFound(join_path(path)))?;
        if leaf.is_empty() {
            return Err(ProviderError::NoData(join_path(path)));
        }
        f(leaf)
    }
}

impl Tick for RealtimeShared {
    fn state(&self) -> PlaybackState {
        self.state.get()
    }

    fn tick(&self, _period: Duration) {
        let frame = lock(&self.client).read_frame();
        match frame {
            Some(frame) => self.ingest(&frame),
            None => debug!("No data from the realtime logger"),
        }
    }

    fn published_index(&self) -> usize {
        lock(&self.buffers).index
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// Provider tailing a live logger
pub struct RealtimeSignalProvider {
    shared: Arc<RealtimeShared>,
    thread: PeriodicThread,
}

impl RealtimeSignalProvider {
    /// Create a provider reading frames from `client`
    pub fn new(config: ProviderConfig, client: Box<dyn VectorsClient>) -> Self {
        let shared = RealtimeShared {
            config,
            state: StateCell::default(),
            client: Mutex::new(client),
            session: RwLock::new(Session::default()),
            buffers: Mutex::new(Buffers::default()),
            selection: RwLock::new(Selection::default()),
            overlays: Overlays::default(),
            notifier: Notifier::default(),
        };
        let always = shared.always_selected();
        write(&shared.selection).entries.insert(always);
        Self {
            shared: Arc::new(shared),
            thread: PeriodicThread::default(),
        }
    }

    /// True while connected to a logger
    pub fn is_open(&self) -> bool {
        read(&self.shared.session).opened
    }

    /// Start buffering the given stream keys (`root::group::signal`) in
    /// addition to the current selection. Samples accumulate from the next
    /// frame on.
    pub fn add_signals_to_buffer<S: AsRef<str>>(&self, signals: &[S]) {
        let mut selection = write(&self.shared.selection);
        for signal in signals {
            let path = split_path(signal.as_ref());
            if !path.is_empty() && selection.entries.insert(path) {
                debug!("Buffering '{}'", signal.as_ref());
            }
        }
    }

    /// Buffer a root-relative path, as overlays and the robot state address
    /// signals without the stream root
    fn buffer_relative(&self, path: &[String]) {
        if path.is_empty() {
            return;
        }
        let mut full = vec![self.shared.root().to_string()];
        full.extend(path.iter().cloned());
        if write(&self.shared.selection).entries.insert(full) {
            debug!("Buffering '{}' for display", join_path(path));
        }
    }

    /// Replace the selection. The joint positions stay selected.
    pub fn set_selected_signals<S: AsRef<str>>(&self, signals: &[S]) {
        let mut entries: BTreeSet<SignalPath> = signals
            .iter()
            .map(|signal| split_path(signal.as_ref()))
            .filter(|path| !path.is_empty())
            .collect();
        entries.insert(self.shared.always_selected());
        write(&self.shared.selection).entries = entries;
    }

    /// Currently selected stream keys
    pub fn selected_signals(&self) -> Vec<String> {
        read(&self.shared.selection)
            .entries
            .iter()
            .map(|path| join_path(path))
            .collect()
    }

    /// Ingest one frame as the playback thread would
    pub fn ingest_frame(&self, frame: &Frame) {
        self.shared.ingest(frame);
    }

    /// Time covered by the retained stream timestamps
    pub fn window_span(&self) -> f64 {
        lock(&self.shared.buffers).timestamps.span()
    }

    /// Samples currently buffered for `path`
    pub fn buffered_len(&self, path: &[String]) -> usize {
        self.shared
            .with_leaf(path, None, |leaf| Ok(leaf.len()))
            .unwrap_or(0)
    }
}

impl SignalProvider for RealtimeSignalProvider {
    fn open(&self, source: &str) -> Result<(), ProviderError> {
        if self.is_open() {
            return Ok(());
        }

        let metadata = {
            let mut client = lock(&self.shared.client);
            client
                .connect(source)
                .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;
            client.metadata()
        };
        let metadata = metadata
            .filter(|metadata| !metadata.is_empty())
            .ok_or_else(|| ProviderError::MetadataUnavailable(source.to_string()))?;

        let root = self.shared.root();
        let joints_name = metadata
            .get(&join_path(&[root, DESCRIPTION_LIST_KEY]))
            .cloned()
            .unwrap_or_else(|| {
                warn!("Logger did not announce the joint list");
                Vec::new()
            });
        let robot_name = metadata
            .get(&join_path(&[root, ROBOT_NAME_KEY]))
            .and_then(|names| names.first())
            .cloned()
            .unwrap_or_default();

        let tree = self.shared.skeleton(&metadata);
        info!(
            "Connected to '{}' ({}): {} joints, {} signals announced",
            source,
            robot_name,
            joints_name.len(),
            tree.leaf_paths().len()
        );

        *lock(&self.shared.buffers) = Buffers {
            tree,
            ..Buffers::default()
        };
        self.shared.overlays.clear();
        *write(&self.shared.session) = Session {
            opened: true,
            joints_name,
            robot_name,
        };
        Ok(())
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Realtime
    }

    fn config(&self) -> &ProviderConfig {
        &self.shared.config
    }

    fn state(&self) -> PlaybackState {
        self.shared.state.get()
    }

    fn set_state(&self, state: PlaybackState) -> bool {
        self.shared.state.set(state)
    }

    fn len(&self) -> usize {
        lock(&self.shared.buffers).timestamps.len()
    }

    fn index(&self) -> usize {
        lock(&self.shared.buffers).index
    }

    fn current_time(&self) -> f64 {
        lock(&self.shared.buffers).current_time
    }

    fn initial_time(&self) -> f64 {
        lock(&self.shared.buffers).initial_time
    }

    fn end_time(&self) -> f64 {
        lock(&self.shared.buffers).end_time
    }

    fn timestamps(&self) -> Vec<f64> {
        lock(&self.shared.buffers).timestamps.to_vec()
    }

    /// The index always follows the latest sample
    fn update_index(&self, index: i64) {
        debug!("Ignoring seek to {} on a live stream", index);
    }

    fn set_dataset_percentage(&self, percentage: f64) {
        debug!("Ignoring seek to {:.1}% on a live stream", percentage * 100.0);
    }

    fn joints_name(&self) -> Vec<String> {
        read(&self.shared.session).joints_name.clone()
    }

    fn robot_name(&self) -> String {
        read(&self.shared.session).robot_name.clone()
    }

    fn signal_paths(&self) -> Vec<SignalPath> {
        let root = self.shared.root();
        lock(&self.shared.buffers)
            .tree
            .leaf_paths()
            .into_iter()
            .filter(|path| path.first().map(String::as_str) == Some(root))
            .map(|mut path| path.split_off(1))
            .collect()
    }

    fn elements_names(&self, path: &[String]) -> Result<Vec<String>, ProviderError> {
        let root = self.shared.root();
        let mut full = vec![root.to_string()];
        full.extend(path.iter().cloned());
        let buffers = lock(&self.shared.buffers);
        let leaf = buffers
            .tree
            .resolve(&full)
            .ok_or_else(|| ProviderError::PathNotFound(join_path(path)))?;
        if let Some(names) = leaf.elements_names() {
            return Ok(names.to_vec());
        }
        Ok(leaf.tail_leaf(1)?.column_labels())
    }

    /// Always the latest row (or the last `neighbor + 1` rows); `index` is
    /// ignored
    fn get_item_from_path_at_index(
        &self,
        path: &[String],
        _index: usize,
        default_path: Option<&[String]>,
        neighbor: usize,
    ) -> Result<DMatrix<f64>, ProviderError> {
        self.shared.with_leaf(path, default_path, |leaf| {
            let tail = leaf.tail_leaf(neighbor.saturating_add(1))?;
            Ok(tail.data().clone())
        })
    }

    fn arrow_max_norm(&self, path: &[String]) -> Result<f64, ProviderError> {
        self.shared
            .with_leaf(path, None, |leaf| Ok(max_arrow_norm(leaf.to_leaf()?.data())))
    }

    fn overlays(&self) -> &Overlays {
        &self.shared.overlays
    }

    fn register_update_index(&self, callback: Box<dyn Fn(usize) + Send + Sync>) {
        self.shared.notifier.register(callback);
    }

    fn register_3d_point(&self, key: &str, path: SignalPath, color: Option<String>) {
        self.buffer_relative(&path);
        self.shared.overlays.points.register(key, path, color);
    }

    fn register_3d_trajectory(&self, key: &str, path: SignalPath, color: Option<String>) {
        self.buffer_relative(&path);
        self.shared.overlays.trajectories.register(key, path, color);
    }

    fn register_3d_arrow(&self, key: &str, path: SignalPath, color: Option<String>) {
        self.buffer_relative(&path);
        self.shared.overlays.arrows.register(key, path, color);
    }

    fn set_robot_state_path(&self, path: RobotStatePath) {
        for signal in [&path.joints, &path.base_position, &path.base_orientation]
            .into_iter()
            .flatten()
        {
            self.buffer_relative(signal);
        }
        self.shared.overlays.set_robot_state_path(path);
    }

    fn clear_update_index_callbacks(&self) {
        self.shared.notifier.clear();
    }

    fn start(&self) -> Result<(), ProviderError> {
        if self.state() == PlaybackState::Closed {
            return Err(ProviderError::Closed);
        }
        if !self.is_open() {
            return Err(ProviderError::NotOpen);
        }
        self.thread.start(
            "realtime-ingest",
            self.shared.config.period(),
            Arc::clone(&self.shared),
        )
    }

    fn close(&self) {
        self.shared.state.set(PlaybackState::Closed);
        self.thread.join();
    }
}

impl Drop for RealtimeSignalProvider {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::collections::HashMap;

    struct Unreachable;

    impl VectorsClient for Unreachable {
        fn connect(&mut self, source: &str) -> Result<(), TransportError> {
            Err(TransportError::ConnectionFailed(source.to_string()))
        }

        fn metadata(&mut self) -> Option<Metadata> {
            None
        }

        fn read_frame(&mut self) -> Option<Frame> {
            None
        }
    }

    struct Silent;

    impl VectorsClient for Silent {
        fn connect(&mut self, _source: &str) -> Result<(), TransportError> {
            Ok(())
        }

        fn metadata(&mut self) -> Option<Metadata> {
            Some(HashMap::new())
        }

        fn read_frame(&mut self) -> Option<Frame> {
            None
        }
    }

    fn path(p: &str) -> Vec<String> {
        split_path(p)
    }

    #[test]
    fn test_selection_matches_both_ways() {
        let selection = Selection {
            entries: [path("r::a::b")].into_iter().collect(),
        };
        assert!(selection.matches(&path("r::a::b")));
        assert!(selection.matches(&path("r::a::b::c")));
        assert!(selection.matches(&path("r::a")));
        assert!(!selection.matches(&path("r::a::bc")));
        assert!(!selection.matches(&path("r::x")));
    }

    #[test]
    fn test_open_failures_are_errors() {
        let provider = RealtimeSignalProvider::new(ProviderConfig::realtime(), Box::new(Unreachable));
        assert!(matches!(
            provider.open("/logger"),
            Err(ProviderError::ConnectionFailed(_))
        ));
        assert!(matches!(provider.start(), Err(ProviderError::NotOpen)));

        let provider = RealtimeSignalProvider::new(ProviderConfig::realtime(), Box::new(Silent));
        assert!(matches!(
            provider.open("/logger"),
            Err(ProviderError::MetadataUnavailable(_))
        ));
        assert!(!provider.is_open());
    }

    #[test]
    fn test_frame_without_timestamp_is_skipped() {
        let provider = RealtimeSignalProvider::new(ProviderConfig::realtime(), Box::new(Silent));
        let frame: Frame = [("robot_realtime::joints_state::positions".to_string(), vec![1.0])]
            .into_iter()
            .collect();
        provider.ingest_frame(&frame);
        assert_eq!(provider.len(), 0);
        assert_eq!(provider.buffered_len(&path("joints_state::positions")), 0);
    }

    #[test]
    fn test_seeking_is_ignored() {
        let provider = RealtimeSignalProvider::new(ProviderConfig::realtime(), Box::new(Silent));
        for t in 0..3 {
            let frame: Frame = [("robot_realtime::timestamps".to_string(), vec![t as f64])]
                .into_iter()
                .collect();
            provider.ingest_frame(&frame);
        }
        provider.update_index(0);
        provider.set_dataset_percentage(0.0);
        assert_eq!(provider.index(), 2);
        assert_eq!(provider.current_time(), 2.0);
    }

    #[test]
    fn test_selected_signals_keep_joint_positions() {
        let provider = RealtimeSignalProvider::new(ProviderConfig::realtime(), Box::new(Silent));
        provider.set_selected_signals(&["robot_realtime::base::position"]);
        assert_eq!(
            provider.selected_signals(),
            vec![
                "robot_realtime::base::position".to_string(),
                "robot_realtime::joints_state::positions".to_string()
            ]
        );
    }
}
