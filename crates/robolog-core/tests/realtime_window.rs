use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use robolog_core::prelude::*;
use robolog_core::transport::{Frame, Metadata, TransportError};

/// Client replaying a fixed metadata map and a queue of frames
struct ScriptedClient {
    metadata: Metadata,
    frames: Arc<Mutex<VecDeque<Frame>>>,
}

impl VectorsClient for ScriptedClient {
    fn connect(&mut self, _source: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn metadata(&mut self) -> Option<Metadata> {
        Some(self.metadata.clone())
    }

    fn read_frame(&mut self) -> Option<Frame> {
        self.frames.lock().ok()?.pop_front()
    }
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn metadata() -> Metadata {
    let mut metadata = HashMap::new();
    metadata.insert("robot_realtime::description_list".to_string(), names(&["l_knee", "r_knee"]));
    metadata.insert("robot_realtime::yarp_robot_name".to_string(), names(&["ergoCubSN001"]));
    metadata.insert("robot_realtime::timestamps".to_string(), names(&["t"]));
    metadata.insert("robot_realtime::joints_state::positions".to_string(), names(&["l_knee", "r_knee"]));
    metadata.insert("robot_realtime::base::position".to_string(), names(&["x", "y", "z"]));
    metadata.insert("robot_realtime::com::position".to_string(), names(&["x", "y", "z"]));
    metadata.insert("robot_realtime::unused".to_string(), Vec::new());
    metadata
}

fn frame(t: f64) -> Frame {
    let mut frame = HashMap::new();
    frame.insert("robot_realtime::timestamps".to_string(), vec![t]);
    frame.insert("robot_realtime::joints_state::positions".to_string(), vec![t, -t]);
    frame.insert("robot_realtime::base::position".to_string(), vec![t, 0.0, 0.6]);
    frame.insert("robot_realtime::com::position".to_string(), vec![0.0, t, 0.5]);
    frame
}

fn connected(frames: Vec<Frame>) -> RealtimeSignalProvider {
    let client = ScriptedClient {
        metadata: metadata(),
        frames: Arc::new(Mutex::new(frames.into())),
    };
    let provider = RealtimeSignalProvider::new(ProviderConfig::realtime(), Box::new(client));
    provider.open("/yarp-robot-logger/rt_logging").unwrap();
    provider
}

fn path(p: &str) -> Vec<String> {
    split_path(p)
}

#[test]
fn test_open_builds_metadata_skeleton() {
    let provider = connected(Vec::new());
    assert_eq!(provider.provider_kind(), ProviderKind::Realtime);
    assert_eq!(provider.joints_name(), names(&["l_knee", "r_knee"]));
    assert_eq!(provider.robot_name(), "ergoCubSN001");
    assert_eq!(
        provider.signal_paths(),
        vec![path("base::position"), path("com::position"), path("joints_state::positions")]
    );
    assert_eq!(provider.elements_names(&path("base::position")).unwrap(), names(&["x", "y", "z"]));
    assert!(provider.is_empty());

    // Already open: no-op
    provider.open("/elsewhere").unwrap();
    assert_eq!(provider.signal_paths().len(), 3);
}

#[test]
fn test_window_keeps_trailing_twenty_seconds() {
    let provider = connected(Vec::new());
    for t in 0..=25 {
        provider.ingest_frame(&frame(t as f64));
    }

    let timestamps = provider.timestamps();
    assert!(provider.window_span() <= 20.0);
    assert!(timestamps[0] >= 5.0);
    assert_eq!(provider.len(), 21);
    assert_eq!(provider.index(), 20);
    assert_eq!(provider.initial_time(), 5.0);
    assert_eq!(provider.end_time(), 25.0);
    assert_eq!(provider.current_time(), 20.0);

    // Per-signal buffers follow the same rule
    assert_eq!(provider.buffered_len(&path("joints_state::positions")), 21);
}

#[test]
fn test_only_selected_signals_are_buffered() {
    let provider = connected(Vec::new());
    for t in 0..5 {
        provider.ingest_frame(&frame(t as f64));
    }
    // Joint positions are always buffered
    assert_eq!(provider.buffered_len(&path("joints_state::positions")), 5);
    assert_eq!(provider.buffered_len(&path("base::position")), 0);
    assert!(matches!(
        provider.get_item_from_path_at_index(&path("base::position"), 0, None, 0),
        Err(ProviderError::NoData(_))
    ));

    provider.add_signals_to_buffer(&["robot_realtime::base::position"]);
    for t in 5..8 {
        provider.ingest_frame(&frame(t as f64));
    }
    // Accumulates from the selection onward only
    assert_eq!(provider.buffered_len(&path("base::position")), 3);
    assert_eq!(provider.buffered_len(&path("com::position")), 0);

    // Selecting a group buffers everything below it
    provider.set_selected_signals(&["robot_realtime::com"]);
    provider.ingest_frame(&frame(8.0));
    assert_eq!(provider.buffered_len(&path("com::position")), 1);
    assert_eq!(provider.buffered_len(&path("base::position")), 3);
    assert_eq!(provider.buffered_len(&path("joints_state::positions")), 9);
}

#[test]
fn test_items_are_always_the_latest() {
    let provider = connected(Vec::new());
    for t in 0..10 {
        provider.ingest_frame(&frame(t as f64));
    }

    let latest = provider
        .get_item_from_path_at_index(&path("joints_state::positions"), 0, None, 0)
        .unwrap();
    assert_eq!(latest.row(0).iter().copied().collect::<Vec<_>>(), vec![9.0, -9.0]);

    let tail = provider
        .get_item_from_path_at_index(&[], 3, Some(&path("joints_state::positions")), 2)
        .unwrap();
    assert_eq!(tail.column(0).iter().copied().collect::<Vec<_>>(), vec![7.0, 8.0, 9.0]);

    let state = provider.get_robot_state_at_index(0).unwrap();
    assert_eq!(state.joints_position.as_slice(), &[9.0, -9.0]);
}

#[test]
fn test_overlays_on_live_stream() {
    let provider = connected(Vec::new());
    provider.add_signals_to_buffer(&["robot_realtime::base::position"]);
    provider.register_3d_trajectory("base", path("base::position"), None);
    provider.register_3d_point("com", path("com::position"), None);

    for t in 0..4 {
        provider.ingest_frame(&frame(t as f64));
    }

    let trajectories = provider.get_3d_trajectory_at_index(provider.index());
    assert_eq!(trajectories.get("base").unwrap().nrows(), 4);

    // Registering an overlay buffers its signal
    let points = provider.get_3d_point_at_index(provider.index());
    assert!(points.missing.is_empty());
    let com = points.get("com").unwrap();
    assert_eq!((com.x, com.y, com.z), (0.0, 3.0, 0.5));
    assert!(provider
        .selected_signals()
        .contains(&"robot_realtime::com::position".to_string()));
}

#[test]
fn test_robot_state_follows_configured_base() {
    let provider = connected(Vec::new());
    provider.ingest_frame(&frame(0.0));
    provider.ingest_frame(&frame(1.0));

    provider.set_robot_state_path(RobotStatePath {
        base_position: Some(path("base::position")),
        ..RobotStatePath::default()
    });
    // Nothing sampled for the base yet: drawn at the origin
    let state = provider.get_robot_state_at_index(provider.index()).unwrap();
    assert_eq!(state.joints_position.as_slice(), &[1.0, -1.0]);
    assert_eq!(state.base_position.as_slice(), &[0.0, 0.0, 0.0]);

    provider.ingest_frame(&frame(2.0));
    let state = provider.get_robot_state_at_index(provider.index()).unwrap();
    assert_eq!(state.base_position.as_slice(), &[2.0, 0.0, 0.6]);
}

#[test]
fn test_out_of_order_frames_are_dropped() {
    let provider = connected(Vec::new());
    for t in [1.0, 2.0, 1.5, 3.0] {
        provider.ingest_frame(&frame(t));
    }
    provider.ingest_frame(&frame(f64::NAN));

    assert_eq!(provider.timestamps(), vec![1.0, 2.0, 3.0]);
    let window = provider
        .get_item_from_path_at_index(&path("joints_state::positions"), 0, None, 3)
        .unwrap();
    assert_eq!(window.column(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);

    provider.register_3d_trajectory("knees", path("joints_state::positions"), None);
    let trajectories = provider.get_3d_trajectory_at_index(provider.index());
    assert!(trajectories.missing.is_empty());
    assert_eq!(trajectories.get("knees").unwrap().nrows(), 3);
}

#[test]
fn test_ingestion_thread_publishes_latest_index() {
    let frames: Vec<Frame> = (0..10).map(|t| frame(t as f64 * 0.01)).collect();
    let config = ProviderConfig::realtime().with_period(Duration::from_millis(1));
    let client = ScriptedClient {
        metadata: metadata(),
        frames: Arc::new(Mutex::new(frames.into())),
    };
    let provider = RealtimeSignalProvider::new(config, Box::new(client));
    provider.open("/yarp-robot-logger/rt_logging").unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    provider.register_update_index(Box::new(move |index| {
        let _ = tx.lock().map(|tx| tx.send(index));
    }));
    provider.start().unwrap();
    provider.set_state(PlaybackState::Running);

    // Ticks keep notifying once the queue runs dry
    let published: Vec<usize> = rx.iter().take(15).collect();
    assert!(published.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*published.last().unwrap(), 9);

    provider.close();
    assert!(!provider.set_state(PlaybackState::Running));
}

#[test]
fn test_demo_client_feeds_provider() {
    let client = DemoClient::new().with_seed(3).with_frame_interval(Duration::from_millis(1));
    let provider = RealtimeSignalProvider::new(ProviderConfig::realtime(), Box::new(client));
    provider.open("demo").unwrap();
    assert_eq!(provider.robot_name(), "demoBot");
    assert_eq!(provider.joints_name().len(), 6);
    assert!(provider.elements_names(&path("contacts::l_foot::force")).is_ok());
}
