//! Archive writing
//!
//! Produces archives in the same layout the reader expects, e.g. to save a
//! realtime session or to build fixtures.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{json, Map, Value};

use super::reader::{DESCRIPTION_LIST_KEY, LOG_GROUP_KEY, ROBOT_NAME_KEY};
use super::ArchiveError;
use crate::store::{join_path, SignalLeaf, StoreError, TextLogLeaf};

/// Builder for a log archive
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root_name: String,
    root: Map<String, Value>,
}

impl ArchiveWriter {
    /// Start an archive with the given root group name and joint list
    pub fn new<S: AsRef<str>>(root_name: impl Into<String>, joints_name: &[S]) -> Self {
        let mut root = Map::new();
        root.insert(
            DESCRIPTION_LIST_KEY.to_string(),
            Value::from(joints_name.iter().map(|j| j.as_ref().to_string()).collect::<Vec<_>>()),
        );
        Self {
            root_name: root_name.into(),
            root,
        }
    }

    /// Set the robot display name
    pub fn with_robot_name(mut self, name: impl Into<String>) -> Self {
        self.root.insert(ROBOT_NAME_KEY.to_string(), Value::String(name.into()));
        self
    }

    /// Add a numeric signal at `path` (relative to the root group)
    pub fn add_signal<S: AsRef<str>>(&mut self, path: &[S], leaf: &SignalLeaf) -> Result<&mut Self, ArchiveError> {
        let rows: Vec<Vec<f64>> = leaf
            .data()
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        let mut group = Map::new();
        group.insert("data".to_string(), json!(rows));
        group.insert("timestamps".to_string(), json!(leaf.timestamps()));
        if let Some(names) = leaf.elements_names() {
            group.insert("elements_names".to_string(), json!(names));
        }
        insert_group(&mut self.root, path, group)?;
        Ok(self)
    }

    /// Add a text log source at `path` (relative to the root's log group).
    /// Messages are written one struct per timestamp.
    pub fn add_text_log<S: AsRef<str>>(&mut self, path: &[S], leaf: &TextLogLeaf) -> Result<&mut Self, ArchiveError> {
        let messages: Vec<Value> = leaf
            .messages()
            .iter()
            .map(|m| json!({"level": m.level.to_string(), "text": m.text}))
            .collect();
        let mut group = Map::new();
        group.insert("data".to_string(), Value::Array(messages));
        group.insert("timestamps".to_string(), json!(leaf.timestamps()));

        let mut full_path = vec![LOG_GROUP_KEY.to_string()];
        full_path.extend(path.iter().map(|s| s.as_ref().to_string()));
        insert_group(&mut self.root, &full_path, group)?;
        Ok(self)
    }

    /// The archive as a JSON document
    pub fn to_value(&self) -> Value {
        let mut top = Map::new();
        top.insert(self.root_name.clone(), Value::Object(self.root.clone()));
        Value::Object(top)
    }

    /// Write the archive to a file
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &self.to_value())?;
        writer.flush()?;
        Ok(())
    }
}

fn insert_group<S: AsRef<str>>(
    root: &mut Map<String, Value>,
    path: &[S],
    group: Map<String, Value>,
) -> Result<(), ArchiveError> {
    let (last, parents) = path.split_last().ok_or(StoreError::EmptyPath)?;
    let mut children = root;
    for segment in parents {
        let node = children
            .entry(segment.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        children = match node {
            Value::Object(next) if !next.contains_key("data") => next,
            _ => {
                return Err(StoreError::PathConflict {
                    path: join_path(path),
                    segment: segment.as_ref().to_string(),
                }
                .into())
            }
        };
    }
    children.insert(last.as_ref().to_string(), Value::Object(group));
    Ok(())
}
