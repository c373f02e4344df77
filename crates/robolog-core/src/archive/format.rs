//! Archive file formats

use std::path::Path;

use super::ArchiveError;

/// Known archive container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// JSON serialization of the logger hierarchy
    Json,
    /// MATLAB v7.3 / HDF5 container
    Hdf5,
}

impl ArchiveFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "json" => Some(ArchiveFormat::Json),
            "mat" | "h5" | "hdf5" => Some(ArchiveFormat::Hdf5),
            _ => None,
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Json => "json",
            ArchiveFormat::Hdf5 => "mat",
        }
    }

    /// Detect the format of `path` and check that this build can read it
    pub fn readable(path: &Path) -> Result<Self, ArchiveError> {
        match Self::from_extension(path) {
            Some(ArchiveFormat::Json) => Ok(ArchiveFormat::Json),
            Some(ArchiveFormat::Hdf5) if cfg!(feature = "hdf5") => Ok(ArchiveFormat::Hdf5),
            Some(ArchiveFormat::Hdf5) => Err(ArchiveError::UnsupportedFormat(format!(
                "{} (built without the hdf5 feature)",
                path.display()
            ))),
            None => Err(ArchiveError::UnsupportedFormat(path.display().to_string())),
        }
    }
}
