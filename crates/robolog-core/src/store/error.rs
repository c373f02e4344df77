//! Signal store errors

use thiserror::Error;

/// Errors that can occur while building or mutating a signal tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Empty signal path")]
    EmptyPath,

    #[error("Path conflict at '{segment}' while resolving '{path}'")]
    PathConflict { path: String, segment: String },

    #[error("Leaf has {rows} data rows but {timestamps} timestamps")]
    LengthMismatch { rows: usize, timestamps: usize },

    #[error("Row {row} has {actual} columns, expected {expected}")]
    ColumnMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Timestamps are not sorted at sample {0}")]
    UnsortedTimestamps(usize),
}
