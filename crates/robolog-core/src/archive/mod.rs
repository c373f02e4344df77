//! Log archives
//!
//! Reads and writes recorded telemetry archives. An archive is a hierarchy
//! of groups under a root group (conventionally `robot_logger_device`);
//! terminal groups carry `data`, `timestamps` and optionally
//! `elements_names`. The root also carries the joint manifest
//! (`description_list`), the robot name and a `log` group of text logs.
//!
//! JSON archives are always readable. MATLAB v7.3 / HDF5 archives need the
//! `hdf5` feature, which links the HDF5 C library.

mod decode;
mod error;
mod format;
#[cfg(feature = "hdf5")]
mod h5;
mod reader;
mod writer;

pub use error::ArchiveError;
pub use format::ArchiveFormat;
pub use reader::{
    load_archive, parse_archive, ArchiveContents, ReferenceTimeline, DEFAULT_ROOT_NAME,
    DESCRIPTION_LIST_KEY, LOG_GROUP_KEY, ROBOT_NAME_KEY,
};
pub use writer::ArchiveWriter;
