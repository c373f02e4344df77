//! Index lookups over sorted timestamp vectors

/// Index of the sample closest to `target`.
///
/// Timestamps must be non-decreasing. When two samples are equally close,
/// or a timestamp value is repeated, the lowest index wins.
pub fn nearest_index(timestamps: &[f64], target: f64) -> Option<usize> {
    let last = timestamps.len().checked_sub(1)?;

    // First sample at or after the target
    let upper = timestamps.partition_point(|&t| t < target);
    if upper == 0 {
        return Some(0);
    }
    if upper > last {
        return Some(first_occurrence(timestamps, last));
    }

    let lower = first_occurrence(timestamps, upper - 1);
    if target - timestamps[lower] <= timestamps[upper] - target {
        Some(lower)
    } else {
        Some(upper)
    }
}

/// Index of the last sample whose timestamp is not after `target`.
pub fn index_not_after(timestamps: &[f64], target: f64) -> Option<usize> {
    timestamps
        .partition_point(|&t| t <= target)
        .checked_sub(1)
}

/// Incremental playback scan.
///
/// Starting from `from`, moves forward while the sample time (relative to
/// `initial_time`) is still before `current_time`. Never moves backwards and
/// never goes past the last sample.
pub fn advance_index(timestamps: &[f64], from: usize, initial_time: f64, current_time: f64) -> usize {
    let last = timestamps.len().saturating_sub(1);
    let mut index = from.min(last);
    while index < last && timestamps[index] - initial_time < current_time {
        index += 1;
    }
    index
}

fn first_occurrence(timestamps: &[f64], index: usize) -> usize {
    let value = timestamps[index];
    timestamps[..index].partition_point(|&t| t < value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_prefers_closer_sample() {
        let ts = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(nearest_index(&ts, 1.4), Some(1));
        assert_eq!(nearest_index(&ts, 1.6), Some(2));
        assert_eq!(nearest_index(&ts, -3.0), Some(0));
        assert_eq!(nearest_index(&ts, 10.0), Some(3));
    }

    #[test]
    fn test_nearest_tie_goes_to_lower_index() {
        let ts = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(nearest_index(&ts, 1.5), Some(1));
        assert_eq!(nearest_index(&ts, 2.5), Some(2));
    }

    #[test]
    fn test_nearest_repeated_timestamps() {
        let ts = [0.0, 1.0, 1.0, 1.0, 2.0];
        assert_eq!(nearest_index(&ts, 1.0), Some(1));
        assert_eq!(nearest_index(&ts, 1.2), Some(1));
        assert_eq!(nearest_index(&[5.0, 5.0], 9.0), Some(0));
    }

    #[test]
    fn test_nearest_empty() {
        assert_eq!(nearest_index(&[], 1.0), None);
    }

    #[test]
    fn test_index_not_after() {
        let ts = [1.0, 2.0, 3.0];
        assert_eq!(index_not_after(&ts, 0.5), None);
        assert_eq!(index_not_after(&ts, 1.0), Some(0));
        assert_eq!(index_not_after(&ts, 2.9), Some(1));
        assert_eq!(index_not_after(&ts, 7.0), Some(2));
    }

    #[test]
    fn test_advance_index_is_monotonic_and_bounded() {
        let ts = [10.0, 10.1, 10.2, 10.3];
        assert_eq!(advance_index(&ts, 0, 10.0, 0.0), 0);
        assert_eq!(advance_index(&ts, 0, 10.0, 0.15), 2);
        // Never moves backwards
        assert_eq!(advance_index(&ts, 3, 10.0, 0.0), 3);
        // Never passes the end
        assert_eq!(advance_index(&ts, 1, 10.0, 100.0), 3);
        assert_eq!(advance_index(&[], 4, 0.0, 1.0), 0);
    }
}
