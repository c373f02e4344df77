//! Archive errors

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while reading or writing a log archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed archive: {0}")]
    JsonError(#[from] serde_json::Error),

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5Error(#[from] hdf5::Error),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("No root group with a 'description_list' entry")]
    MissingRoot,

    #[error("Joint name list could not be decoded: {0}")]
    InvalidManifest(String),

    #[error("Invalid leaf '{path}': {message}")]
    InvalidLeaf { path: String, message: String },

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
}
