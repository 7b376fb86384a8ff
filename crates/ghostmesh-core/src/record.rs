//! Memory records and the memory log line format
//!
//! A memory is a piece of text with an [`Ordinal`]: its zero-based position
//! in the append-only log. The ordinal of a record is also the position of
//! its embedding in the vector index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Zero-based position of a memory in the log
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ordinal(usize);

impl Ordinal {
    /// Create an ordinal from a log position
    pub fn new(position: usize) -> Self {
        Self(position)
    }

    /// Get the log (and index) position
    pub fn as_usize(&self) -> usize {
        self.0
    }

    /// The ordinal assigned to the record appended after this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ordinal({})", self.0)
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for Ordinal {
    fn from(position: usize) -> Self {
        Self(position)
    }
}

/// One logical memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    /// Position in the log, never reused
    pub ordinal: Ordinal,

    /// Memory content
    pub text: String,
}

impl MemoryRecord {
    pub fn new(ordinal: Ordinal, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
        }
    }
}

/// A single line of the memory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Memory content
    pub text: String,

    /// When the entry was appended. Absent in older logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    ///
    /// Fails with [`Error::InvalidRecord`] if the text is empty after trimming.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidRecord(
                "memory text must not be empty".to_string(),
            ));
        }
        Ok(Self {
            text,
            created_at: Some(Utc::now()),
        })
    }

    /// Encode as one JSON line, without the trailing newline
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode one log line
    ///
    /// Blank lines yield `None`. A line that is not a JSON object with a
    /// non-empty `text` string is kept verbatim (trimmed) as the text.
    pub fn parse_line(line: &str) -> Option<LineText> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        // Only `text` is read; other fields may be malformed or unknown
        #[derive(Deserialize)]
        struct TextField {
            text: String,
        }

        match serde_json::from_str::<TextField>(line) {
            Ok(entry) if !entry.text.trim().is_empty() => Some(LineText::Structured(entry.text)),
            _ => Some(LineText::Raw(line.to_string())),
        }
    }
}

/// Text recovered from a log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineText {
    /// The `text` field of a well-formed entry
    Structured(String),
    /// The whole line, kept because it did not parse as an entry
    Raw(String),
}

impl LineText {
    pub fn is_raw(&self) -> bool {
        matches!(self, LineText::Raw(_))
    }

    pub fn into_text(self) -> String {
        match self {
            LineText::Structured(text) | LineText::Raw(text) => text,
        }
    }
}
