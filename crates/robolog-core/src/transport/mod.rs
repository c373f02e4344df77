//! Realtime transport
//!
//! The realtime provider talks to a logger through [`VectorsClient`]: one
//! metadata query after connecting, then one flat frame per read. Keys are
//! `::`-separated paths such as `robot_realtime::joints_state::positions`.

mod demo;
mod tcp;

use std::collections::HashMap;

use thiserror::Error;

pub use demo::DemoClient;
pub use tcp::TcpVectorsClient;

/// Key → per-column labels, as announced by the logger
pub type Metadata = HashMap<String, Vec<String>>;

/// Key → sample values for one instant
pub type Frame = HashMap<String, Vec<f64>>;

/// Errors raised by realtime clients
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed by peer")]
    Closed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A source of realtime frames
pub trait VectorsClient: Send {
    /// Connect to `source` (an address or a logical port name)
    fn connect(&mut self, source: &str) -> Result<(), TransportError>;

    /// Stream metadata. `None` when the logger did not announce any.
    fn metadata(&mut self) -> Option<Metadata>;

    /// Next frame, waiting at most the client's read timeout.
    /// `None` when no frame arrived in time.
    fn read_frame(&mut self) -> Option<Frame>;
}
