//! Text log leaves
//!
//! Text messages recorded alongside the numeric signals. They live in a
//! separate tree and are looked up by "last message not after" a time.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{search, SignalTree, StoreError};

/// Severity of a text log message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    /// Failure reported by the robot
    Error,
    /// Recoverable anomaly
    Warning,
    /// Normal operation
    Info,
    /// Developer detail
    Debug,
    /// Any level string not recognized above
    Other(String),
}

impl LogLevel {
    /// Parse a level name as written by the logger
    pub fn parse(level: &str) -> Self {
        match level.trim().to_ascii_uppercase().as_str() {
            "ERROR" => LogLevel::Error,
            "WARNING" | "WARN" => LogLevel::Warning,
            "INFO" => LogLevel::Info,
            "DEBUG" => LogLevel::Debug,
            _ => LogLevel::Other(level.trim().to_string()),
        }
    }

    /// Display color used by the log table
    pub fn color(&self) -> &'static str {
        match self {
            LogLevel::Error => "#d62728",
            LogLevel::Warning => "#ff7f0e",
            LogLevel::Debug => "#1f77b4",
            LogLevel::Info => "#2ca02c",
            LogLevel::Other(_) => "black",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Other(level) => write!(f, "{}", level),
        }
    }
}

/// One text log message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLogMessage {
    /// Severity
    pub level: LogLevel,
    /// Message body
    pub text: String,
}

impl TextLogMessage {
    /// Message with the given severity
    pub fn new(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// Messages of one logging source with their timestamps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLogLeaf {
    messages: Vec<TextLogMessage>,
    timestamps: Vec<f64>,
}

impl TextLogLeaf {
    /// Text log leaf; fails unless there is one timestamp per message
    pub fn new(messages: Vec<TextLogMessage>, timestamps: Vec<f64>) -> Result<Self, StoreError> {
        if messages.len() != timestamps.len() {
            return Err(StoreError::LengthMismatch {
                rows: messages.len(),
                timestamps: timestamps.len(),
            });
        }
        Ok(Self {
            messages,
            timestamps,
        })
    }

    /// Messages in time order
    pub fn messages(&self) -> &[TextLogMessage] {
        &self.messages
    }

    /// Message timestamps
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when there is no message
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Message and timestamp at `index`
    pub fn get(&self, index: usize) -> Option<(f64, &TextLogMessage)> {
        Some((*self.timestamps.get(index)?, self.messages.get(index)?))
    }

    /// Index of the last message logged at or before `timestamp`
    pub fn index_not_after(&self, timestamp: f64) -> Option<usize> {
        search::index_not_after(&self.timestamps, timestamp)
    }
}

/// Tree of text log sources
pub type TextLogTree = SignalTree<TextLogLeaf>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_and_color() {
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
        assert_eq!(LogLevel::parse(" WARNING "), LogLevel::Warning);
        assert_eq!(LogLevel::parse("TRACE"), LogLevel::Other("TRACE".into()));
        assert_eq!(LogLevel::Error.color(), "#d62728");
        assert_eq!(LogLevel::Other("x".into()).color(), "black");
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
    }

    #[test]
    fn test_index_not_after() {
        let leaf = TextLogLeaf::new(
            vec![
                TextLogMessage::new(LogLevel::Info, "boot"),
                TextLogMessage::new(LogLevel::Warning, "low battery"),
            ],
            vec![1.0, 5.0],
        )
        .unwrap();
        assert_eq!(leaf.index_not_after(0.5), None);
        assert_eq!(leaf.index_not_after(4.9), Some(0));
        assert_eq!(leaf.index_not_after(5.0), Some(1));
        assert_eq!(leaf.get(1).unwrap().1.text, "low battery");
    }

    #[test]
    fn test_length_mismatch() {
        let err = TextLogLeaf::new(vec![], vec![1.0]).unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch { rows: 0, timestamps: 1 }));
    }
}
