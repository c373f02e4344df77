//! # robolog Core Library
//!
//! Signal provider subsystem for the robolog telemetry viewer.
//!
//! This library provides:
//! - A hierarchical in-memory store for independently sampled signals
//! - Reading and writing of recorded log archives
//! - An offline provider replaying archives with a playback clock
//! - A realtime provider tailing a live logger over a sliding window
//! - Path-keyed registries for 3D points, trajectories and arrows
//!
//! ## Example
//!
//! ```rust,ignore
//! use robolog_core::prelude::*;
//!
//! let provider = OfflineSignalProvider::new(ProviderConfig::offline());
//! provider.open("walking.json")?;
//! provider.register_update_index(Box::new(|index| println!("index {}", index)));
//! provider.start()?;
//! provider.set_state(PlaybackState::Running);
//!
//! let state = provider.get_robot_state_at_index(provider.index())?;
//! println!("joints: {}", state.joints_position);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod archive;
pub mod config;
pub mod provider;
pub mod store;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::archive::{load_archive, ArchiveContents, ArchiveWriter};
    pub use crate::config::{ProviderConfig, TcpClientConfig};
    pub use crate::provider::{
        Arrow, ArrowScaling, OfflineSignalProvider, OverlayQuery, PlaybackState, ProviderError,
        ProviderKind, RealtimeSignalProvider, RobotState, RobotStatePath, SignalProvider,
    };
    pub use crate::store::{split_path, join_path, SignalLeaf, SignalPath};
    pub use crate::transport::{DemoClient, TcpVectorsClient, VectorsClient};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
