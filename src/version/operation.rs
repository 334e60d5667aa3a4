//! Recorded mutations.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier of one recorded operation (a UUID v4 string).
pub type VersionId = String;

/// Public write verbs of the facade. Also used as event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Set,
    Delete,
    Clean,
    Load,
    Loads,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Set, Verb::Delete, Verb::Clean, Verb::Load, Verb::Loads];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Set => "set",
            Verb::Delete => "delete",
            Verb::Clean => "clean",
            Verb::Load => "load",
            Verb::Loads => "loads",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verb with its arguments, as replayed against a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Set { key: String, value: Value },
    Delete { key: String },
    Clean,
    Load { path: PathBuf },
    Loads { snapshot: String },
    /// Clean, then load `snapshot`. Undoes any bulk verb exactly.
    Restore { snapshot: String },
}

impl Operation {
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Operation::Set {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Operation::Delete { key: key.into() }
    }

    /// The public verb this operation corresponds to. `Restore` is internal
    /// to the log and has none.
    pub fn verb(&self) -> Option<Verb> {
        match self {
            Operation::Set { .. } => Some(Verb::Set),
            Operation::Delete { .. } => Some(Verb::Delete),
            Operation::Clean => Some(Verb::Clean),
            Operation::Load { .. } => Some(Verb::Load),
            Operation::Loads { .. } => Some(Verb::Loads),
            Operation::Restore { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.verb().map_or("restore", Verb::as_str)
    }
}

/// Immutable `(id, forward, revert)` entry of the operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: VersionId,
    pub forward: Operation,
    /// `None` when the forward step cannot be undone.
    pub revert: Option<Operation>,
}
