//! Archive loading
//!
//! Walks the logger hierarchy depth first (keys in ascending order, as HDF5
//! iterates them) and builds the numeric tree, the text log tree and the
//! reference timeline.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::decode::{decode_messages, decode_numbers, decode_rows, decode_text, decode_text_list};
use super::{ArchiveError, ArchiveFormat};
use crate::store::{join_path, DataTree, SignalLeaf, TextLogLeaf, TextLogTree};

/// Conventional name of the logger root group
pub const DEFAULT_ROOT_NAME: &str = "robot_logger_device";

/// Key holding the ordered joint names under the root group
pub const DESCRIPTION_LIST_KEY: &str = "description_list";

/// Key holding the robot display name under the root group
pub const ROBOT_NAME_KEY: &str = "yarp_robot_name";

/// Root-level group holding text logs
pub const LOG_GROUP_KEY: &str = "log";

/// MATLAB reference table, never a signal
pub(super) const REFS_KEY: &str = "#refs#";

/// The timestamp vector used for index-based navigation.
///
/// Whenever a leaf starts earlier than the current `initial_time`, or ends
/// later than the current `end_time`, its timestamps replace the reference
/// vector. The result is the most temporally expansive single signal seen,
/// not a merge of all signals.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTimeline {
    timestamps: Vec<f64>,
    initial_time: f64,
    end_time: f64,
}

impl Default for ReferenceTimeline {
    fn default() -> Self {
        Self {
            timestamps: Vec::new(),
            initial_time: f64::INFINITY,
            end_time: f64::NEG_INFINITY,
        }
    }
}

impl ReferenceTimeline {
    /// Empty timeline, with inverted bounds so the first leaf always wins
    pub fn new() -> Self {
        Self::default()
    }

    /// Consider a leaf's timestamps as the new reference
    pub fn observe(&mut self, timestamps: &[f64]) {
        let (Some(&first), Some(&last)) = (timestamps.first(), timestamps.last()) else {
            return;
        };
        if first < self.initial_time {
            self.timestamps = timestamps.to_vec();
            self.initial_time = first;
        }
        if last > self.end_time {
            self.timestamps = timestamps.to_vec();
            self.end_time = last;
        }
    }

    /// Reference timestamps
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Earliest timestamp of the reference
    pub fn initial_time(&self) -> f64 {
        self.initial_time
    }

    /// Latest timestamp of the reference
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Number of reference samples
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True before any leaf was observed
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Time of sample `index` relative to `initial_time`
    pub fn relative_time(&self, index: usize) -> Option<f64> {
        self.timestamps.get(index).map(|t| t - self.initial_time)
    }

    /// Length of the playable range
    pub fn duration(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.end_time - self.initial_time
        }
    }
}

/// Everything loaded from one archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveContents {
    /// Name of the adopted root group
    pub root_name: String,
    /// Numeric signals, with the root group at the top level
    pub data: DataTree,
    /// Text logs, keyed by path below the root's `log` group
    pub text_logging: TextLogTree,
    /// Reference timeline for index navigation
    pub timeline: ReferenceTimeline,
    /// Ordered joint names from `description_list`
    pub joints_name: Vec<String>,
    /// Robot display name, empty when absent
    pub robot_name: String,
}

/// Load an archive file
pub fn load_archive(path: impl AsRef<Path>) -> Result<ArchiveContents, ArchiveError> {
    let path = path.as_ref();
    let format = ArchiveFormat::readable(path)?;
    info!("Loading {:?} archive {}", format, path.display());
    let document: Value = match format {
        ArchiveFormat::Json => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        #[cfg(feature = "hdf5")]
        ArchiveFormat::Hdf5 => super::h5::read_document(path)?,
        #[cfg(not(feature = "hdf5"))]
        ArchiveFormat::Hdf5 => return Err(ArchiveError::UnsupportedFormat(path.display().to_string())),
    };
    parse_archive(&document)
}

/// Build archive contents from a parsed document
pub fn parse_archive(document: &Value) -> Result<ArchiveContents, ArchiveError> {
    let top = document.as_object().ok_or(ArchiveError::MissingRoot)?;
    let (root_name, root) = find_root(top).ok_or(ArchiveError::MissingRoot)?;

    let joints_name = root
        .get(DESCRIPTION_LIST_KEY)
        .map(decode_text_list)
        .unwrap_or_else(|| Err("missing".to_string()))
        .map_err(ArchiveError::InvalidManifest)?;

    let robot_name = match root.get(ROBOT_NAME_KEY).map(decode_text) {
        Some(Ok(name)) => name,
        Some(Err(e)) => {
            warn!("Could not decode robot name: {}", e);
            String::new()
        }
        None => String::new(),
    };

    let mut contents = ArchiveContents {
        root_name: root_name.clone(),
        joints_name,
        robot_name,
        ..ArchiveContents::default()
    };

    for (name, value) in top {
        if name == REFS_KEY || !value.is_object() {
            continue;
        }
        populate_signals(name, value, &root_name, &mut contents)?;
    }

    if let Some(log) = root.get(LOG_GROUP_KEY).and_then(Value::as_object) {
        contents.text_logging = populate_text_logging(log)?;
    }

    debug!(
        "Archive root '{}': {} signals, {} text logs, {} reference samples",
        contents.root_name,
        contents.data.leaf_paths().len(),
        contents.text_logging.leaf_paths().len(),
        contents.timeline.len()
    );
    Ok(contents)
}

/// The conventional root if it carries a joint manifest, otherwise the
/// first top-level group that does
fn find_root(top: &Map<String, Value>) -> Option<(String, &Map<String, Value>)> {
    if let Some(root) = top.get(DEFAULT_ROOT_NAME).and_then(manifest_group) {
        return Some((DEFAULT_ROOT_NAME.to_string(), root));
    }
    top.iter()
        .filter(|(name, _)| name.as_str() != REFS_KEY)
        .find_map(|(name, value)| manifest_group(value).map(|root| (name.clone(), root)))
}

fn manifest_group(value: &Value) -> Option<&Map<String, Value>> {
    value
        .as_object()
        .filter(|group| group.contains_key(DESCRIPTION_LIST_KEY))
}

/// Depth-first walk of one top-level group into the numeric tree
fn populate_signals(
    name: &str,
    value: &Value,
    root_name: &str,
    contents: &mut ArchiveContents,
) -> Result<(), ArchiveError> {
    let mut stack: Vec<(Vec<String>, &Value)> = vec![(vec![name.to_string()], value)];

    while let Some((path, value)) = stack.pop() {
        let Some(group) = value.as_object() else {
            continue;
        };
        if is_leaf_group(group) {
            match decode_signal_leaf(&path, group) {
                Ok(leaf) => {
                    contents.timeline.observe(leaf.timestamps());
                    contents.data.insert_leaf(&path, leaf)?;
                }
                Err(e) => warn!("Skipping signal: {}", e),
            }
            continue;
        }
        // Reverse so the stack pops children in ascending key order
        for (child, child_value) in group.iter().rev() {
            if child == REFS_KEY || !child_value.is_object() {
                continue;
            }
            if path.len() == 1 && path[0] == root_name && child == LOG_GROUP_KEY {
                continue;
            }
            let mut child_path = path.clone();
            child_path.push(child.clone());
            stack.push((child_path, child_value));
        }
    }
    Ok(())
}

fn is_leaf_group(group: &Map<String, Value>) -> bool {
    group.contains_key("data")
}

fn decode_signal_leaf(path: &[String], group: &Map<String, Value>) -> Result<SignalLeaf, ArchiveError> {
    let invalid = |message: String| ArchiveError::InvalidLeaf {
        path: join_path(path),
        message,
    };

    let rows = group.get("data").map(decode_rows).unwrap_or_else(|| Ok(Vec::new())).map_err(invalid)?;
    let timestamps = group
        .get("timestamps")
        .ok_or_else(|| invalid("missing timestamps".to_string()))
        .and_then(|ts| decode_numbers(ts).map_err(invalid))?;

    let leaf = SignalLeaf::from_rows(&rows, timestamps).map_err(|e| invalid(e.to_string()))?;

    let Some(names) = group.get("elements_names") else {
        return Ok(leaf);
    };
    match decode_text_list(names) {
        Ok(names) if names.len() == leaf.columns() => Ok(leaf.with_elements_names(names)),
        Ok(names) => {
            warn!(
                "'{}' has {} element names for {} columns, using positional names",
                join_path(path),
                names.len(),
                leaf.columns()
            );
            Ok(leaf)
        }
        Err(e) => {
            warn!("Could not decode element names of '{}': {}", join_path(path), e);
            Ok(leaf)
        }
    }
}

fn populate_text_logging(log: &Map<String, Value>) -> Result<TextLogTree, ArchiveError> {
    let mut tree = TextLogTree::new();
    let mut stack: Vec<(Vec<String>, &Map<String, Value>)> = vec![(Vec::new(), log)];

    while let Some((prefix, group)) = stack.pop() {
        for (name, value) in group.iter().rev() {
            let Some(child) = value.as_object() else {
                continue;
            };
            let mut path = prefix.clone();
            path.push(name.clone());
            if !is_leaf_group(child) {
                stack.push((path, child));
                continue;
            }
            match decode_text_leaf(&path, child) {
                Ok(leaf) => {
                    tree.insert_leaf(&path, leaf)?;
                }
                Err(e) => warn!("Skipping text log: {}", e),
            }
        }
    }
    Ok(tree)
}

fn decode_text_leaf(path: &[String], group: &Map<String, Value>) -> Result<TextLogLeaf, ArchiveError> {
    let invalid = |message: String| ArchiveError::InvalidLeaf {
        path: join_path(path),
        message,
    };
    let timestamps = group
        .get("timestamps")
        .ok_or_else(|| invalid("missing timestamps".to_string()))
        .and_then(|ts| decode_numbers(ts).map_err(invalid))?;
    let messages = group
        .get("data")
        .map(|data| decode_messages(data, timestamps.len()))
        .unwrap_or_else(|| Ok(Vec::new()))
        .map_err(invalid)?;
    TextLogLeaf::new(messages, timestamps).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_timeline_widest_extent_wins() {
        let mut timeline = ReferenceTimeline::new();
        timeline.observe(&[1.0, 2.0, 3.0]);
        assert_eq!(timeline.timestamps(), &[1.0, 2.0, 3.0]);

        // Starts later, ends earlier: ignored
        timeline.observe(&[1.5, 2.5]);
        assert_eq!(timeline.timestamps(), &[1.0, 2.0, 3.0]);

        // Ends later: becomes the reference, initial time is kept
        timeline.observe(&[2.0, 4.0]);
        assert_eq!(timeline.timestamps(), &[2.0, 4.0]);
        assert_eq!(timeline.initial_time(), 1.0);
        assert_eq!(timeline.end_time(), 4.0);

        timeline.observe(&[]);
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn test_timeline_equal_extent_keeps_first() {
        let mut timeline = ReferenceTimeline::new();
        timeline.observe(&[0.0, 2.0]);
        timeline.observe(&[0.0, 1.0, 2.0]);
        assert_eq!(timeline.timestamps(), &[0.0, 2.0]);

        // Visited in key order: "base" before "joints"
        let doc = json!({
            "robot_logger_device": {
                "description_list": ["j0"],
                "joints": {"data": [1, 2, 3], "timestamps": [0.0, 1.0, 2.0]},
                "base": {"data": [1, 2], "timestamps": [0.0, 2.0]}
            }
        });
        let contents = parse_archive(&doc).unwrap();
        assert_eq!(contents.timeline.timestamps(), &[0.0, 2.0]);
    }

    #[test]
    fn test_root_discovery_tolerates_renaming() {
        let doc = json!({
            "#refs#": {"description_list": []},
            "renamed_logger": {
                "description_list": ["j0"],
                "joints_state": {"positions": {"data": [[0.1]], "timestamps": [0.0]}}
            }
        });
        let contents = parse_archive(&doc).unwrap();
        assert_eq!(contents.root_name, "renamed_logger");
        assert_eq!(contents.joints_name, vec!["j0".to_string()]);
        assert!(contents
            .data
            .resolve(&["renamed_logger", "joints_state", "positions"])
            .is_some());
    }

    #[test]
    fn test_missing_root_fails() {
        let doc = json!({"something": {"joints_state": {}}});
        assert!(matches!(parse_archive(&doc), Err(ArchiveError::MissingRoot)));
        assert!(matches!(parse_archive(&json!([1, 2])), Err(ArchiveError::MissingRoot)));
    }

    #[test]
    fn test_bad_manifest_fails() {
        let doc = json!({"robot_logger_device": {"description_list": 4}});
        assert!(matches!(parse_archive(&doc), Err(ArchiveError::InvalidManifest(_))));
    }

    #[test]
    fn test_partial_decode_failures_are_skipped() {
        let doc = json!({
            "robot_logger_device": {
                "description_list": ["j0"],
                "yarp_robot_name": {"not": "text"},
                "good": {"data": [[1.0, 2.0]], "timestamps": [0.0], "elements_names": ["x"]},
                "bad_length": {"data": [[1.0], [2.0]], "timestamps": [0.0]},
                "bad_values": {"data": [["a"]], "timestamps": [0.0]}
            }
        });
        let contents = parse_archive(&doc).unwrap();
        assert_eq!(contents.robot_name, "");
        let good = contents.data.resolve(&["robot_logger_device", "good"]).unwrap();
        // Name count does not match the columns: positional fallback
        assert!(good.elements_names().is_none());
        assert!(contents.data.resolve(&["robot_logger_device", "bad_length"]).is_none());
        assert!(contents.data.resolve(&["robot_logger_device", "bad_values"]).is_none());
    }

    #[test]
    fn test_text_logging_is_separate() {
        let doc = json!({
            "robot_logger_device": {
                "description_list": ["j0"],
                "log": {
                    "walking": {
                        "data": [{"level": "INFO", "text": "go"}],
                        "timestamps": [3.0]
                    }
                }
            }
        });
        let contents = parse_archive(&doc).unwrap();
        assert!(contents.data.is_empty());
        let leaf = contents.text_logging.resolve(&["walking"]).unwrap();
        assert_eq!(leaf.messages()[0].text, "go");
        assert!(contents.timeline.is_empty());
    }
}
