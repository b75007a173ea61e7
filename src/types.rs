//! Shared identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully qualified record identifier (`collection/key`).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

/// Opaque security session identifier scoping lock ownership.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Identifier of a work queue record.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct QueueId(pub String);

impl RecordId {
    /// Collection component of the identifier, when present.
    pub fn collection(&self) -> Option<&str> {
        self.0.split_once('/').map(|(c, _)| c)
    }

    /// Key component of the identifier, when present.
    pub fn key(&self) -> Option<&str> {
        self.0.split_once('/').map(|(_, k)| k)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(value.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_owned())
    }
}

impl From<&str> for QueueId {
    fn from(value: &str) -> Self {
        QueueId(value.to_owned())
    }
}
