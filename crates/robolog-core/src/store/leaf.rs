//! Signal leaves
//!
//! [`SignalLeaf`] is the immutable matrix form used by the offline provider.
//! [`BufferedLeaf`] is the deque form used by the realtime provider; it
//! supports O(1) append and front eviction, and is materialized into a
//! [`SignalLeaf`] only when a consumer reads it.

use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector};

use super::search;
use super::StoreError;

/// A terminal node: a data matrix plus one timestamp per row
#[derive(Debug, Clone, PartialEq)]
pub struct SignalLeaf {
    /// Rows are samples, columns are channel components
    data: DMatrix<f64>,
    /// Sample times, non-decreasing
    timestamps: Vec<f64>,
    /// Optional per-column labels
    elements_names: Option<Vec<String>>,
}

impl SignalLeaf {
    /// Create a leaf from a matrix and its timestamps
    pub fn new(data: DMatrix<f64>, timestamps: Vec<f64>) -> Result<Self, StoreError> {
        if data.nrows() != timestamps.len() {
            return Err(StoreError::LengthMismatch {
                rows: data.nrows(),
                timestamps: timestamps.len(),
            });
        }
        if let Some(i) = timestamps.windows(2).position(|w| w[1] < w[0]) {
            return Err(StoreError::UnsortedTimestamps(i + 1));
        }
        Ok(Self {
            data,
            timestamps,
            elements_names: None,
        })
    }

    /// Create a leaf from row vectors. All rows must have the same width.
    pub fn from_rows(rows: &[Vec<f64>], timestamps: Vec<f64>) -> Result<Self, StoreError> {
        let columns = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns) {
            return Err(StoreError::ColumnMismatch {
                row,
                expected: columns,
                actual: r.len(),
            });
        }
        let data = DMatrix::from_fn(rows.len(), columns, |r, c| rows[r][c]);
        Self::new(data, timestamps)
    }

    /// Attach per-column labels
    pub fn with_elements_names(mut self, names: Vec<String>) -> Self {
        self.elements_names = Some(names);
        self
    }

    /// Samples, one row per timestamp
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Sample timestamps
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Column labels, when the archive stored them
    pub fn elements_names(&self) -> Option<&[String]> {
        self.elements_names.as_deref()
    }

    /// Column labels, falling back to positional names when none were stored
    pub fn column_labels(&self) -> Vec<String> {
        match &self.elements_names {
            Some(names) => names.clone(),
            None => (0..self.columns()).map(|i| i.to_string()).collect(),
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when the leaf holds no sample
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Number of channel components
    pub fn columns(&self) -> usize {
        self.data.ncols()
    }

    /// Timestamp of the first sample
    pub fn first_timestamp(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    /// Timestamp of the last sample
    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// Row at an exact sample index
    pub fn row(&self, index: usize) -> Option<DVector<f64>> {
        (index < self.len()).then(|| self.data.row(index).transpose())
    }

    /// Index of the sample closest to `timestamp` (ties go to the earlier sample)
    pub fn nearest_index(&self, timestamp: f64) -> Option<usize> {
        search::nearest_index(&self.timestamps, timestamp)
    }

    /// Row closest in time to `timestamp`
    pub fn row_nearest(&self, timestamp: f64) -> Option<DVector<f64>> {
        self.nearest_index(timestamp).and_then(|i| self.row(i))
    }

    /// Rows within `neighbor` samples of the one closest to `timestamp`,
    /// clipped to the leaf bounds
    pub fn window_around(&self, timestamp: f64, neighbor: usize) -> Option<DMatrix<f64>> {
        let center = self.nearest_index(timestamp)?;
        let start = center.saturating_sub(neighbor);
        let end = (center + neighbor + 1).min(self.len());
        Some(self.data.rows(start, end - start).into_owned())
    }

    /// Last `count` rows (fewer if the leaf is shorter)
    pub fn tail(&self, count: usize) -> DMatrix<f64> {
        let count = count.min(self.len());
        self.data.rows(self.len() - count, count).into_owned()
    }
}

/// Pad a matrix with zero columns up to `width`. Wider matrices are unchanged.
pub fn pad_columns(matrix: DMatrix<f64>, width: usize) -> DMatrix<f64> {
    if matrix.ncols() >= width {
        matrix
    } else {
        matrix.resize_horizontally(width, 0.0)
    }
}

/// Pad or truncate a vector to exactly `width` entries
pub fn fit_vector(vector: &DVector<f64>, width: usize) -> DVector<f64> {
    DVector::from_fn(width, |i, _| vector.get(i).copied().unwrap_or(0.0))
}

/// Append-only timestamp deque trimmed to a trailing time window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeWindow {
    timestamps: VecDeque<f64>,
}

impl TimeWindow {
    /// Empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timestamp
    pub fn push(&mut self, timestamp: f64) {
        self.timestamps.push_back(timestamp);
    }

    /// Drop samples older than `window` seconds relative to `newest`.
    /// Returns how many samples were removed.
    pub fn evict(&mut self, newest: f64, window: f64) -> usize {
        let mut evicted = 0;
        while let Some(&oldest) = self.timestamps.front() {
            if newest - oldest <= window {
                break;
            }
            self.timestamps.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Number of timestamps
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Oldest timestamp
    pub fn first(&self) -> Option<f64> {
        self.timestamps.front().copied()
    }

    /// Newest timestamp
    pub fn last(&self) -> Option<f64> {
        self.timestamps.back().copied()
    }

    /// Time covered by the retained samples
    pub fn span(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Timestamps, oldest first
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.timestamps.iter().copied()
    }

    /// Contiguous copy of the retained timestamps
    pub fn to_vec(&self) -> Vec<f64> {
        self.timestamps.iter().copied().collect()
    }

    /// Drop every timestamp
    pub fn clear(&mut self) {
        self.timestamps.clear();
    }
}

/// Realtime leaf backed by deques
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedLeaf {
    data: VecDeque<Vec<f64>>,
    timestamps: TimeWindow,
    elements_names: Option<Vec<String>>,
}

impl BufferedLeaf {
    /// Empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty leaf carrying labels from stream metadata
    pub fn with_elements_names(names: Vec<String>) -> Self {
        Self {
            elements_names: Some(names),
            ..Self::default()
        }
    }

    /// Column labels, when the logger sent them
    pub fn elements_names(&self) -> Option<&[String]> {
        self.elements_names.as_deref()
    }

    /// Append one sample
    pub fn push(&mut self, value: Vec<f64>, timestamp: f64) {
        self.data.push_back(value);
        self.timestamps.push(timestamp);
    }

    /// Drop samples older than `window` seconds relative to `newest`
    pub fn evict(&mut self, newest: f64, window: f64) -> usize {
        let evicted = self.timestamps.evict(newest, window);
        self.data.drain(..evicted);
        evicted
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Buffered timestamps
    pub fn timestamps(&self) -> &TimeWindow {
        &self.timestamps
    }

    /// Materialize the whole buffer as a matrix leaf
    pub fn to_leaf(&self) -> Result<SignalLeaf, StoreError> {
        self.tail_leaf(self.len())
    }

    /// Materialize only the last `count` samples
    pub fn tail_leaf(&self, count: usize) -> Result<SignalLeaf, StoreError> {
        let skip = self.len() - count.min(self.len());
        let rows: Vec<Vec<f64>> = self.data.iter().skip(skip).cloned().collect();
        let timestamps: Vec<f64> = self.timestamps.iter().skip(skip).collect();
        let leaf = SignalLeaf::from_rows(&rows, timestamps)?;
        Ok(match &self.elements_names {
            Some(names) => leaf.with_elements_names(names.clone()),
            None => leaf,
        })
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        self.data.clear();
        self.timestamps.clear();
    }
}
