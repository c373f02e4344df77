//! Demo Mode - simulated robot logger
//!
//! Generates a plausible robot feed without a running logger: a handful of
//! joints swinging sinusoidally with a little noise, a base drifting on a
//! circle, and a contact force that pulses with the gait.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Frame, Metadata, TransportError, VectorsClient};
use crate::config::REALTIME_ROOT_NAME;

const DEFAULT_JOINTS: [&str; 6] = [
    "l_hip_pitch",
    "l_knee",
    "l_ankle_pitch",
    "r_hip_pitch",
    "r_knee",
    "r_ankle_pitch",
];

/// Gait frequency in Hz
const STEP_FREQUENCY: f64 = 0.8;

/// Simulated realtime logger
pub struct DemoClient {
    root: String,
    joints: Vec<String>,
    connected: bool,
    /// Wall clock time of the first frame, seconds
    start_time: Option<f64>,
    /// Interval between frames
    frame_interval: Duration,
    last_frame: Option<f64>,
    rng: StdRng,
}

impl Default for DemoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoClient {
    /// Demo client with the default frame interval
    pub fn new() -> Self {
        Self {
            root: REALTIME_ROOT_NAME.to_string(),
            joints: DEFAULT_JOINTS.iter().map(|j| j.to_string()).collect(),
            connected: false,
            start_time: None,
            frame_interval: Duration::from_millis(10),
            last_frame: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic noise, for tests
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Set the time between generated frames
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    fn key(&self, path: &str) -> String {
        format!("{}::{}", self.root, path)
    }

    /// Build the frame for wall clock time `now` (seconds)
    pub fn frame_at(&mut self, now: f64) -> Frame {
        let start = *self.start_time.get_or_insert(now);
        let t = now - start;
        let phase = 2.0 * PI * STEP_FREQUENCY * t;

        let mut frame = HashMap::new();
        frame.insert(self.key("timestamps"), vec![now]);

        let positions: Vec<f64> = (0..self.joints.len())
            .map(|i| {
                // Right leg half a cycle behind the left
                let offset = if i < self.joints.len() / 2 { 0.0 } else { PI };
                let amplitude = 0.3 + 0.1 * (i % 3) as f64;
                amplitude * (phase + offset).sin() + self.rng.gen_range(-0.005..0.005)
            })
            .collect();
        let velocities: Vec<f64> = (0..self.joints.len())
            .map(|i| {
                let offset = if i < self.joints.len() / 2 { 0.0 } else { PI };
                let amplitude = 0.3 + 0.1 * (i % 3) as f64;
                amplitude * 2.0 * PI * STEP_FREQUENCY * (phase + offset).cos()
            })
            .collect();
        frame.insert(self.key("joints_state::positions"), positions);
        frame.insert(self.key("joints_state::velocities"), velocities);

        let heading = 0.05 * t;
        frame.insert(
            self.key("base::position"),
            vec![heading.cos(), heading.sin(), 0.6 + 0.01 * (2.0 * phase).sin()],
        );
        frame.insert(self.key("base::orientation"), vec![0.0, 0.0, heading + PI / 2.0]);

        let force = 300.0 * (0.5 + 0.5 * phase.sin()) + self.rng.gen_range(-2.0..2.0);
        frame.insert(self.key("contacts::l_foot::force"), vec![0.0, 0.0, force]);
        frame.insert(self.key("contacts::r_foot::force"), vec![0.0, 0.0, 300.0 - force]);
        frame
    }
}

impl VectorsClient for DemoClient {
    fn connect(&mut self, _source: &str) -> Result<(), TransportError> {
        self.connected = true;
        self.start_time = None;
        self.last_frame = None;
        Ok(())
    }

    fn metadata(&mut self) -> Option<Metadata> {
        if !self.connected {
            return None;
        }
        let xyz = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let mut metadata = HashMap::new();
        metadata.insert(self.key("description_list"), self.joints.clone());
        metadata.insert(self.key("yarp_robot_name"), vec!["demoBot".to_string()]);
        metadata.insert(self.key("timestamps"), vec!["t".to_string()]);
        metadata.insert(self.key("joints_state::positions"), self.joints.clone());
        metadata.insert(self.key("joints_state::velocities"), self.joints.clone());
        metadata.insert(self.key("base::position"), xyz.clone());
        metadata.insert(
            self.key("base::orientation"),
            vec!["roll".to_string(), "pitch".to_string(), "yaw".to_string()],
        );
        metadata.insert(self.key("contacts::l_foot::force"), xyz.clone());
        metadata.insert(self.key("contacts::r_foot::force"), xyz);
        Some(metadata)
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if !self.connected {
            return None;
        }
        let mut now = wall_clock_seconds();
        if let Some(last) = self.last_frame {
            let wait = self.frame_interval.as_secs_f64() - (now - last);
            if wait > 0.0 {
                thread::sleep(Duration::from_secs_f64(wait));
                now = wall_clock_seconds();
            }
        }
        self.last_frame = Some(now);
        Some(self.frame_at(now))
    }
}

fn wall_clock_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_match_metadata() {
        let mut client = DemoClient::new().with_seed(7);
        assert!(client.metadata().is_none());
        client.connect("demo").unwrap();

        let metadata = client.metadata().unwrap();
        let frame = client.frame_at(100.0);
        for (key, values) in &frame {
            assert_eq!(metadata[key].len(), values.len(), "{}", key);
        }
        assert_eq!(frame["robot_realtime::timestamps"], vec![100.0]);
    }

    #[test]
    fn test_legs_alternate() {
        let mut client = DemoClient::new().with_seed(1);
        client.frame_at(0.0);
        // Quarter cycle: left hip near its maximum, right hip near its minimum
        let frame = client.frame_at(1.0 / (4.0 * STEP_FREQUENCY));
        let positions = &frame["robot_realtime::joints_state::positions"];
        assert!(positions[0] > 0.25);
        assert!(positions[3] < -0.25);
    }

    #[test]
    fn test_read_frame_uses_wall_clock() {
        let mut client = DemoClient::new().with_frame_interval(Duration::from_millis(1));
        client.connect("demo").unwrap();
        let first = client.read_frame().unwrap()["robot_realtime::timestamps"][0];
        let second = client.read_frame().unwrap()["robot_realtime::timestamps"][0];
        assert!(second > first);
    }
}
