//! Archive replay tool
//!
//! Opens a log archive, lists its signals and plays it back for a few
//! seconds, printing the joint positions at every index update.
//!
//! Usage:
//!   cargo run --example replay -- <archive.json> [SECONDS]

use std::env;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use robolog_core::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("Usage: replay <archive.json> [SECONDS]");
    }
    let seconds: f64 = match args.get(2) {
        Some(s) => s.parse().context("SECONDS must be a number")?,
        None => 3.0,
    };

    let provider = OfflineSignalProvider::new(ProviderConfig::offline());
    provider
        .open(&args[1])
        .with_context(|| format!("Failed to open {}", args[1]))?;

    println!("Robot: {}", provider.robot_name());
    println!("Joints: {}", provider.joints_name().join(", "));
    println!(
        "Duration: {:.2} s over {} samples",
        provider.end_time() - provider.initial_time(),
        provider.len()
    );
    println!("\nSignals:");
    for path in provider.signal_paths() {
        let labels = provider.elements_names(&path)?;
        println!("  - {} [{}]", join_path(&path), labels.join(", "));
    }

    provider.register_update_index(Box::new(|index| {
        if index % 10 == 0 {
            println!("index {}", index);
        }
    }));
    provider.start()?;
    provider.set_state(PlaybackState::Running);
    thread::sleep(Duration::from_secs_f64(seconds));
    provider.set_state(PlaybackState::Paused);

    let index = provider.index();
    match provider.get_robot_state_at_index(index) {
        Ok(state) => println!(
            "\nAt t = {:.3} s (index {}): joints = {:?}",
            provider.current_time(),
            index,
            state.joints_position.as_slice()
        ),
        Err(e) => println!("\nNo robot state at index {}: {}", index, e),
    }

    provider.close();
    Ok(())
}
