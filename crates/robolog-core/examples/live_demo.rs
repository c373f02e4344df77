//! Realtime ingestion demo
//!
//! Runs the realtime provider against the simulated logger (or a TCP logger
//! when an address is given) and prints the buffered window once a second.
//!
//! Usage:
//!   cargo run --example live_demo -- [HOST:PORT]

use std::env;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use robolog_core::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let address = env::args().nth(1);
    let client: Box<dyn VectorsClient> = match &address {
        Some(_) => Box::new(TcpVectorsClient::new(TcpClientConfig::default())),
        None => Box::new(DemoClient::new()),
    };
    let source = address.as_deref().unwrap_or("demo");

    let provider = RealtimeSignalProvider::new(ProviderConfig::realtime().with_window(5.0), client);
    provider
        .open(source)
        .with_context(|| format!("Could not connect to {}", source))?;
    provider.add_signals_to_buffer(&["robot_realtime::base::position"]);
    provider.register_3d_trajectory("base", split_path("base::position"), None);

    provider.start()?;
    provider.set_state(PlaybackState::Running);

    for _ in 0..8 {
        thread::sleep(Duration::from_secs(1));
        let trajectories = provider.get_3d_trajectory_at_index(provider.index());
        let base_samples = trajectories.get("base").map(|t| t.nrows()).unwrap_or(0);
        println!(
            "{} samples over {:.2} s, base trajectory has {} points",
            provider.len(),
            provider.current_time(),
            base_samples
        );
    }

    provider.close();
    Ok(())
}
