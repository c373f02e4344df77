//! Offline signal provider
//!
//! Replays a recorded archive. The dataset is immutable once loaded and is
//! swapped atomically on reload; the playback cursor lives behind its own
//! lock and is advanced by the playback clock.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use nalgebra::DMatrix;
use tracing::{debug, info};

use super::clock::{Notifier, PeriodicThread, PlaybackState, StateCell, Tick};
use super::{lock, max_arrow_norm, read, write, Overlays, ProviderError, ProviderKind, SignalProvider};
use crate::archive::{load_archive, ArchiveContents};
use crate::config::ProviderConfig;
use crate::store::{join_path, search, SignalLeaf, SignalPath, TextLogMessage, TextLogTree};

/// Playback position, guarded by the index lock
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    index: usize,
    /// Seconds since the start of the reference timeline
    current_time: f64,
}

struct OfflineShared {
    config: ProviderConfig,
    state: StateCell,
    dataset: RwLock<Arc<ArchiveContents>>,
    cursor: Mutex<Cursor>,
    overlays: Overlays,
    notifier: Notifier,
}

impl OfflineShared {
    fn dataset(&self) -> Arc<ArchiveContents> {
        Arc::clone(&read(&self.dataset))
    }

    fn seek(&self, index: i64) {
        let dataset = self.dataset();
        let timeline = &dataset.timeline;
        let mut cursor = lock(&self.cursor);
        if timeline.is_empty() {
            *cursor = Cursor::default();
            return;
        }
        let last = (timeline.len() - 1) as i64;
        let index = index.clamp(0, last) as usize;
        cursor.index = index;
        cursor.current_time = timeline.relative_time(index).unwrap_or(0.0);
    }
}

impl Tick for OfflineShared {
    fn state(&self) -> PlaybackState {
        self.state.get()
    }

    fn tick(&self, period: Duration) {
        let dataset = self.dataset();
        let timeline = &dataset.timeline;
        if timeline.is_empty() {
            return;
        }
        let mut cursor = lock(&self.cursor);
        cursor.current_time = (cursor.current_time + period.as_secs_f64()).min(timeline.duration());
        cursor.index = search::advance_index(
            timeline.timestamps(),
            cursor.index,
            timeline.initial_time(),
            cursor.current_time,
        );
    }

    fn published_index(&self) -> usize {
        lock(&self.cursor).index
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// Provider replaying a recorded archive
pub struct OfflineSignalProvider {
    shared: Arc<OfflineShared>,
    thread: PeriodicThread,
}

impl OfflineSignalProvider {
    /// Create a closed provider; call `open` then `start`
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            shared: Arc::new(OfflineShared {
                config,
                state: StateCell::default(),
                dataset: RwLock::new(Arc::new(ArchiveContents::default())),
                cursor: Mutex::new(Cursor::default()),
                overlays: Overlays::default(),
                notifier: Notifier::default(),
            }),
            thread: PeriodicThread::default(),
        }
    }

    /// Install already parsed contents, as `open` does after reading a file
    pub fn load(&self, contents: ArchiveContents) {
        info!(
            "Loaded '{}' ({}): {} signals, {} reference samples",
            contents.root_name,
            contents.robot_name,
            contents.data.leaf_paths().len(),
            contents.timeline.len()
        );
        *write(&self.shared.dataset) = Arc::new(contents);
        *lock(&self.shared.cursor) = Cursor::default();
        self.shared.overlays.clear();
    }

    /// The loaded dataset
    pub fn dataset(&self) -> Arc<ArchiveContents> {
        self.shared.dataset()
    }

    /// Name of the root group signal paths are relative to
    pub fn root_name(&self) -> String {
        self.shared.dataset().root_name.clone()
    }

    /// Copy of the text logging tree
    pub fn text_logging_data(&self) -> TextLogTree {
        self.shared.dataset().text_logging.clone()
    }

    /// Every text log source, relative to the log group
    pub fn text_logging_paths(&self) -> Vec<SignalPath> {
        self.shared.dataset().text_logging.leaf_paths()
    }

    /// Index of the last message of `path` logged at or before the current time
    pub fn text_log_index(&self, path: &[String]) -> Result<Option<usize>, ProviderError> {
        let dataset = self.shared.dataset();
        let leaf = dataset
            .text_logging
            .resolve(path)
            .ok_or_else(|| ProviderError::PathNotFound(join_path(path)))?;
        let now = self.current_time() + dataset.timeline.initial_time();
        Ok(leaf.index_not_after(now))
    }

    /// Message `index` of text log `path`, with its timestamp
    pub fn text_log_message(&self, path: &[String], index: usize) -> Option<(f64, TextLogMessage)> {
        let dataset = self.shared.dataset();
        let leaf = dataset.text_logging.resolve(path)?;
        leaf.get(index).map(|(t, message)| (t, message.clone()))
    }

    fn with_leaf<T>(
        &self,
        path: &[String],
        default_path: Option<&[String]>,
        f: impl FnOnce(&ArchiveContents, &SignalLeaf) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let dataset = self.shared.dataset();
        let path = match (path.is_empty(), default_path) {
            (true, Some(default_path)) => default_path,
            _ => path,
        };
        if path.is_empty() {
            return Err(ProviderError::PathNotFound(String::new()));
        }
        let mut full = Vec::with_capacity(path.len() + 1);
        full.push(dataset.root_name.as_str());
        full.extend(path.iter().map(String::as_str));
        let leaf = dataset
            .data
            .resolve(&full)
            .ok_or_else(|| ProviderError::PathNotFound(join_path(path)))?;
        f(&dataset, leaf)
    }
}

impl Default for OfflineSignalProvider {
    fn default() -> Self {
        Self::new(ProviderConfig::offline())
    }
}

impl SignalProvider for OfflineSignalProvider {
    fn open(&self, source: &str) -> Result<(), ProviderError> {
        let contents = load_archive(source)?;
        self.load(contents);
        Ok(())
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Offline
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
        self.shared.dataset().timeline.len()
    }

    fn index(&self) -> usize {
        lock(&self.shared.cursor).index
    }

    fn current_time(&self) -> f64 {
        lock(&self.shared.cursor).current_time
    }

    fn initial_time(&self) -> f64 {
        self.shared.dataset().timeline.initial_time()
    }

    fn end_time(&self) -> f64 {
        self.shared.dataset().timeline.end_time()
    }

    fn timestamps(&self) -> Vec<f64> {
        self.shared.dataset().timeline.timestamps().to_vec()
    }

    fn update_index(&self, index: i64) {
        self.shared.seek(index);
    }

    fn set_dataset_percentage(&self, percentage: f64) {
        let target = (percentage * self.len() as f64).round() as i64;
        debug!("Seeking to {:.1}% (sample {})", percentage * 100.0, target);
        self.shared.seek(target);
    }

    fn joints_name(&self) -> Vec<String> {
        self.shared.dataset().joints_name.clone()
    }

    fn robot_name(&self) -> String {
        self.shared.dataset().robot_name.clone()
    }

    fn signal_paths(&self) -> Vec<SignalPath> {
        let dataset = self.shared.dataset();
        dataset
            .data
            .leaf_paths()
            .into_iter()
            .filter(|path| path.first() == Some(&dataset.root_name))
            .map(|mut path| path.split_off(1))
            .collect()
    }

    fn elements_names(&self, path: &[String]) -> Result<Vec<String>, ProviderError> {
        self.with_leaf(path, None, |_, leaf| Ok(leaf.column_labels()))
    }

    fn get_item_from_path_at_index(
        &self,
        path: &[String],
        index: usize,
        default_path: Option<&[String]>,
        neighbor: usize,
    ) -> Result<DMatrix<f64>, ProviderError> {
        self.with_leaf(path, default_path, |dataset, leaf| {
            let reference = dataset.timeline.timestamps();
            let last = reference.len().checked_sub(1).ok_or(ProviderError::NotOpen)?;
            let timestamp = reference[index.min(last)];
            leaf.window_around(timestamp, neighbor)
                .ok_or_else(|| ProviderError::NoData(join_path(path)))
        })
    }

    fn arrow_max_norm(&self, path: &[String]) -> Result<f64, ProviderError> {
        self.with_leaf(path, None, |_, leaf| Ok(max_arrow_norm(leaf.data())))
    }

    fn overlays(&self) -> &Overlays {
        &self.shared.overlays
    }

    fn register_update_index(&self, callback: Box<dyn Fn(usize) + Send + Sync>) {
        self.shared.notifier.register(callback);
    }

    fn clear_update_index_callbacks(&self) {
        self.shared.notifier.clear();
    }

    fn start(&self) -> Result<(), ProviderError> {
        if self.state() == PlaybackState::Closed {
            return Err(ProviderError::Closed);
        }
        self.thread.start(
            "offline-playback",
            self.shared.config.period(),
            Arc::clone(&self.shared),
        )
    }

    fn close(&self) {
        self.shared.state.set(PlaybackState::Closed);
        self.thread.join();
    }
}

impl Drop for OfflineSignalProvider {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::parse_archive;
    use serde_json::json;

    fn provider() -> OfflineSignalProvider {
        let doc = json!({
            "robot_logger_device": {
                "description_list": ["j0", "j1"],
                "yarp_robot_name": "ergoCubSN000",
                "joints_state": {
                    "positions": {
                        "data": [[0.0, 0.0], [0.1, 0.2], [0.2, 0.4], [0.3, 0.6]],
                        "timestamps": [10.0, 11.0, 12.0, 13.0]
                    }
                },
                "com": {
                    "data": [[1.0, 2.0], [3.0, 4.0]],
                    "timestamps": [10.5, 12.5]
                }
            }
        });
        let provider = OfflineSignalProvider::default();
        provider.load(parse_archive(&doc).unwrap());
        provider
    }

    fn path(p: &str) -> Vec<String> {
        crate::store::split_path(p)
    }

    #[test]
    fn test_seek_and_current_time() {
        let provider = provider();
        provider.update_index(2);
        assert_eq!(provider.index(), 2);
        assert_eq!(provider.current_time(), 2.0);

        provider.update_index(-5);
        assert_eq!(provider.index(), 0);
        provider.update_index(99);
        assert_eq!(provider.index(), 3);
        assert_eq!(provider.current_time(), 3.0);
    }

    #[test]
    fn test_tick_advances_incrementally() {
        let provider = provider();
        let shared = &provider.shared;
        shared.tick(Duration::from_millis(500));
        assert_eq!(provider.index(), 1);
        shared.tick(Duration::from_millis(500));
        assert_eq!(provider.index(), 1);
        shared.tick(Duration::from_secs(10));
        assert_eq!(provider.index(), 3);
        // Clamped to the end of the timeline
        assert_eq!(provider.current_time(), 3.0);
    }

    #[test]
    fn test_default_path_and_signal_listing() {
        let provider = provider();
        let row = provider
            .get_item_from_path_at_index(&[], 1, Some(&path("joints_state::positions")), 0)
            .unwrap();
        assert_eq!(row.row(0).iter().copied().collect::<Vec<_>>(), vec![0.1, 0.2]);

        assert!(matches!(
            provider.get_item_from_path_at_index(&[], 1, None, 0),
            Err(ProviderError::PathNotFound(_))
        ));
        assert_eq!(provider.signal_paths(), vec![path("com"), path("joints_state::positions")]);
        assert_eq!(
            provider.elements_names(&path("com")).unwrap(),
            vec!["0".to_string(), "1".to_string()]
        );
    }

    #[test]
    fn test_reference_timeline_is_the_widest_leaf() {
        let provider = provider();
        assert_eq!(provider.len(), 4);
        assert_eq!(provider.initial_time(), 10.0);
        assert_eq!(provider.end_time(), 13.0);
    }

    #[test]
    fn test_closed_provider_cannot_start() {
        let provider = provider();
        provider.close();
        assert!(!provider.set_state(PlaybackState::Running));
        assert!(matches!(provider.start(), Err(ProviderError::Closed)));
    }
}
