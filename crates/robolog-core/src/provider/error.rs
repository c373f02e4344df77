//! Provider errors

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Errors returned by signal providers
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No dataset is open")]
    NotOpen,

    #[error("Signal not found: {0}")]
    PathNotFound(String),

    #[error("Signal '{0}' has no samples")]
    NoData(String),

    #[error("No overlay registered under '{0}'")]
    NotRegistered(String),

    #[error("Unexpected shape for '{path}': {message}")]
    InvalidShape { path: String, message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Metadata unavailable from '{0}'")]
    MetadataUnavailable(String),

    #[error("Playback thread already started")]
    AlreadyStarted,

    #[error("Provider is closed")]
    Closed,

    #[error("Failed to spawn playback thread: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
