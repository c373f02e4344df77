//! Hierarchical Data Store
//!
//! In-memory model shared by the offline and realtime providers: a tree of
//! named groups whose leaves hold a sample matrix and a timestamp per row.
//! Leaves are sampled independently, so lookups align by nearest timestamp
//! rather than by a shared row index.

mod error;
mod leaf;
pub mod search;
mod text_log;
mod tree;

pub use error::StoreError;
pub use leaf::{fit_vector, pad_columns, BufferedLeaf, SignalLeaf, TimeWindow};
pub use text_log::{LogLevel, TextLogLeaf, TextLogMessage, TextLogTree};
pub use tree::{SignalNode, SignalTree};

/// Separator used in flat stream keys (`root::group::leaf`)
pub const PATH_SEPARATOR: &str = "::";

/// An ordered list of path segments
pub type SignalPath = Vec<String>;

/// Numeric tree used by the offline provider
pub type DataTree = SignalTree<SignalLeaf>;

/// Numeric tree used by the realtime provider
pub type BufferedTree = SignalTree<BufferedLeaf>;

/// Split a flat key into path segments. Accepts `::` and `/` separators.
pub fn split_path(key: &str) -> SignalPath {
    key.split(PATH_SEPARATOR)
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join path segments into a flat `::` key
pub fn join_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|segment| segment.as_ref())
        .collect::<Vec<&str>>()
        .join(PATH_SEPARATOR)
}

/// True if `prefix` matches the first segments of `path`
pub fn is_path_prefix<S: AsRef<str>, T: AsRef<str>>(prefix: &[S], path: &[T]) -> bool {
    prefix.len() <= path.len()
        && prefix
            .iter()
            .zip(path)
            .all(|(a, b)| a.as_ref() == b.as_ref())
}
