//! Documents and change flags as seen by replication filters.

use serde_json::{Map, Value};

/// Flags carried alongside a document change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DocumentFlags {
    /// The change is a deletion (tombstone).
    pub deleted: bool,
    /// The user lost access to every channel the document is in.
    pub access_removed: bool,
}

impl DocumentFlags {
    /// Flags for an ordinary, live revision.
    pub const NONE: Self = Self {
        deleted: false,
        access_removed: false,
    };

    /// Flags for a tombstone.
    pub const DELETED: Self = Self {
        deleted: true,
        access_removed: false,
    };

    /// Returns true if the change is a deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A single document revision passing through replication.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    rev: String,
    body: Map<String, Value>,
}

/// Properties with a leading underscore are gateway metadata, not content.
fn is_metadata_key(key: &str) -> bool {
    key.starts_with('_')
}

impl Document {
    /// Creates a document from an ID, revision and body.
    ///
    /// Metadata properties (`_id`, `_rev`, `_deleted`, ...) are stripped from
    /// the body.
    pub fn new(id: impl Into<String>, rev: impl Into<String>, mut body: Map<String, Value>) -> Self {
        body.retain(|key, _| !is_metadata_key(key));
        Self {
            id: id.into(),
            rev: rev.into(),
            body,
        }
    }

    /// Returns the document ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the revision ID.
    #[must_use]
    pub fn rev(&self) -> &str {
        &self.rev
    }

    /// Returns the document body without metadata.
    #[must_use]
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Returns a top-level property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Consumes the document, returning its body as a JSON value.
    #[must_use]
    pub fn into_body(self) -> Value {
        Value::Object(self.body)
    }
}
