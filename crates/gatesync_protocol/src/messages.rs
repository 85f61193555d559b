//! Gateway REST messages used by the replicator.
//!
//! Pull reads the channel-filtered `_changes` feed with document bodies
//! inlined; push writes through `_bulk_docs`.

use crate::document::{Document, DocumentFlags};
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the gateway's channel filter for the changes feed.
pub const CHANNEL_FILTER: &str = "sync_gateway/bychannel";

/// An opaque changes-feed sequence.
///
/// Gateways report sequences either as integers or as compound strings such
/// as `"1204:56"`; both are kept in their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawSequence", into = "String")]
pub struct Sequence(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSequence {
    Number(u64),
    Text(String),
}

impl From<RawSequence> for Sequence {
    fn from(raw: RawSequence) -> Self {
        match raw {
            RawSequence::Number(n) => Self(n.to_string()),
            RawSequence::Text(s) => Self(s),
        }
    }
}

impl From<Sequence> for String {
    fn from(seq: Sequence) -> Self {
        seq.0
    }
}

impl Sequence {
    /// Wraps a textual sequence.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request for one page of the changes feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesRequest {
    /// Resume after this sequence; `None` starts from the beginning.
    pub since: Option<Sequence>,
    /// Channels to read. Must be non-empty.
    pub channels: Vec<String>,
    /// Maximum number of entries in the page.
    pub limit: u32,
}

impl ChangesRequest {
    /// Creates a request for the first page of `channels`.
    pub fn new(channels: Vec<String>, limit: u32) -> Self {
        Self {
            since: None,
            channels,
            limit,
        }
    }

    /// Sets the resume sequence.
    pub fn with_since(mut self, since: Option<Sequence>) -> Self {
        self.since = since;
        self
    }

    /// Returns the query string parameters for `GET /_changes`.
    pub fn query_pairs(&self) -> ProtocolResult<Vec<(&'static str, String)>> {
        if self.channels.is_empty() {
            return Err(ProtocolError::invalid(
                "changes request needs at least one channel",
            ));
        }

        let mut pairs = vec![
            ("feed", "normal".to_string()),
            ("filter", CHANNEL_FILTER.to_string()),
            ("channels", self.channels.join(",")),
            ("include_docs", "true".to_string()),
            ("style", "all_docs".to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(since) = &self.since {
            pairs.push(("since", since.to_string()));
        }
        Ok(pairs)
    }
}

/// One revision reference inside a change entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRef {
    /// Revision ID.
    pub rev: String,
}

/// A single entry of the changes feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Sequence of this change.
    pub seq: Sequence,
    /// Document ID.
    pub id: String,
    /// Leaf revisions; the first one is the winner.
    #[serde(default)]
    pub changes: Vec<RevisionRef>,
    /// The winning revision is a tombstone.
    #[serde(default)]
    pub deleted: bool,
    /// Channels the user was removed from for this document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<String>>,
    /// Inlined document body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

/// ID prefixes of user and role entries in the changes feed.
const PRINCIPAL_PREFIXES: [&str; 2] = ["_user/", "_role/"];

impl ChangeEntry {
    /// Returns true for user and role entries, which carry no document.
    #[must_use]
    pub fn is_principal(&self) -> bool {
        PRINCIPAL_PREFIXES
            .iter()
            .any(|prefix| self.id.starts_with(prefix))
    }

    /// Returns the winning revision, from the leaf list or the inlined body.
    #[must_use]
    pub fn winning_rev(&self) -> Option<&str> {
        self.changes.first().map(|r| r.rev.as_str()).or_else(|| {
            self.doc
                .as_ref()
                .and_then(|doc| doc.get("_rev"))
                .and_then(Value::as_str)
        })
    }

    /// Returns the flags describing this change.
    #[must_use]
    pub fn flags(&self) -> DocumentFlags {
        let doc_deleted = self
            .doc
            .as_ref()
            .and_then(|doc| doc.get("_deleted"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        DocumentFlags {
            deleted: self.deleted || doc_deleted,
            access_removed: self.removed.as_ref().is_some_and(|r| !r.is_empty()),
        }
    }

    /// Converts the entry into a document plus its flags.
    ///
    /// Tombstones and access removals may arrive without a body; they yield
    /// an empty document. Callers skip entries without a
    /// [`winning_rev`](Self::winning_rev) before converting.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Invalid`] if the body is not a JSON object or
    /// the entry has no revision.
    pub fn to_document(&self) -> ProtocolResult<(Document, DocumentFlags)> {
        let flags = self.flags();
        let body = match &self.doc {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                return Err(ProtocolError::invalid(format!(
                    "document {} has non-object body: {}",
                    self.id, other
                )))
            }
        };

        let rev = self
            .winning_rev()
            .ok_or_else(|| {
                ProtocolError::invalid(format!("change for {} has no revision", self.id))
            })?
            .to_string();

        Ok((Document::new(self.id.clone(), rev, body), flags))
    }
}

/// One page of the changes feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesResponse {
    /// Change entries, in sequence order.
    #[serde(default)]
    pub results: Vec<ChangeEntry>,
    /// Sequence to resume from.
    pub last_seq: Sequence,
}

impl ChangesResponse {
    /// Decodes a response body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the response to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A `_bulk_docs` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkDocsRequest {
    /// Documents with `_id` and, for updates, `_rev` set.
    pub docs: Vec<Value>,
    /// Let the gateway assign new revision IDs.
    pub new_edits: bool,
}

impl BulkDocsRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: Vec::new(),
            new_edits: true,
        }
    }

    /// Adds a document update based on the last revision the gateway knows.
    pub fn push(&mut self, id: &str, parent_rev: Option<&str>, body: &Value) {
        let mut map = match body {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        map.retain(|key, _| !key.starts_with('_'));
        map.insert("_id".into(), Value::String(id.to_string()));
        if let Some(rev) = parent_rev {
            map.insert("_rev".into(), Value::String(rev.to_string()));
        }
        self.docs.push(Value::Object(map));
    }

    /// Returns the number of documents in the request.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns true if the request carries no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Encodes the request to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Default for BulkDocsRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-document outcome of a `_bulk_docs` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDocsResult {
    /// Document ID.
    pub id: String,
    /// Revision assigned by the gateway on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Error name on failure, e.g. `"conflict"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BulkDocsResult {
    /// Returns the accepted revision, if the write succeeded.
    #[must_use]
    pub fn accepted_rev(&self) -> Option<&str> {
        match (&self.error, &self.rev) {
            (None, Some(rev)) => Some(rev),
            _ => None,
        }
    }

    /// Decodes a `_bulk_docs` response body.
    pub fn decode_all(bytes: &[u8]) -> ProtocolResult<Vec<Self>> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Error body returned by the gateway with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayErrorBody {
    /// Short error name, e.g. `"Unauthorized"`.
    #[serde(default)]
    pub error: String,
    /// Longer explanation.
    #[serde(default)]
    pub reason: String,
}

impl GatewayErrorBody {
    /// Decodes an error body, returning `None` if it is not JSON.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence_accepts_numbers_and_strings() {
        let numeric: Sequence = serde_json::from_value(json!(42)).unwrap();
        let compound: Sequence = serde_json::from_value(json!("1204:56")).unwrap();
        assert_eq!(numeric.as_str(), "42");
        assert_eq!(compound.as_str(), "1204:56");
        assert_eq!(serde_json::to_value(&numeric).unwrap(), json!("42"));
    }

    #[test]
    fn query_pairs_use_channel_filter() {
        let request = ChangesRequest::new(vec!["orders".into(), "invoices".into()], 50)
            .with_since(Some(Sequence::new("17")));
        let pairs = request.query_pairs().unwrap();

        assert!(pairs.contains(&("filter", CHANNEL_FILTER.to_string())));
        assert!(pairs.contains(&("channels", "orders,invoices".to_string())));
        assert!(pairs.contains(&("limit", "50".to_string())));
        assert!(pairs.contains(&("since", "17".to_string())));
    }

    #[test]
    fn query_pairs_reject_empty_channels() {
        let request = ChangesRequest::new(Vec::new(), 50);
        assert!(request.query_pairs().is_err());
    }

    #[test]
    fn decode_changes_page() {
        let body = json!({
            "results": [
                {"seq": 3, "id": "order::1", "changes": [{"rev": "2-b"}],
                 "doc": {"_id": "order::1", "_rev": "2-b", "total": 10}},
                {"seq": 4, "id": "order::2", "changes": [{"rev": "3-c"}], "deleted": true},
                {"seq": 5, "id": "order::3", "changes": [{"rev": "1-d"}], "removed": ["orders"]}
            ],
            "last_seq": 5
        });
        let response = ChangesResponse::decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(response.results.len(), 3);
        assert_eq!(response.last_seq.as_str(), "5");

        let (doc, flags) = response.results[0].to_document().unwrap();
        assert_eq!(doc.id(), "order::1");
        assert_eq!(doc.rev(), "2-b");
        assert_eq!(doc.get("total"), Some(&json!(10)));
        assert_eq!(flags, DocumentFlags::NONE);

        let (_, flags) = response.results[1].to_document().unwrap();
        assert!(flags.deleted);

        let (_, flags) = response.results[2].to_document().unwrap();
        assert!(flags.access_removed);
        assert!(!flags.deleted);
    }

    #[test]
    fn deleted_marker_inside_doc_sets_flag() {
        let entry: ChangeEntry = serde_json::from_value(json!({
            "seq": "9", "id": "x", "changes": [{"rev": "2-z"}],
            "doc": {"_id": "x", "_rev": "2-z", "_deleted": true}
        }))
        .unwrap();
        assert!(entry.flags().is_deleted());
    }

    #[test]
    fn principal_entries_are_recognized() {
        let user: ChangeEntry =
            serde_json::from_value(json!({"seq": 1, "id": "_user/alice", "changes": []}))
                .unwrap();
        let role: ChangeEntry =
            serde_json::from_value(json!({"seq": 2, "id": "_role/ops", "changes": []})).unwrap();
        let doc: ChangeEntry = serde_json::from_value(
            json!({"seq": 3, "id": "user_prefs", "changes": [{"rev": "1-a"}]}),
        )
        .unwrap();

        assert!(user.is_principal());
        assert!(role.is_principal());
        assert!(!doc.is_principal());
        assert_eq!(user.winning_rev(), None);
    }

    #[test]
    fn winning_rev_falls_back_to_body() {
        let entry: ChangeEntry = serde_json::from_value(json!({
            "seq": 4, "id": "x", "doc": {"_id": "x", "_rev": "3-c", "n": 1}
        }))
        .unwrap();
        assert_eq!(entry.winning_rev(), Some("3-c"));
        assert_eq!(entry.to_document().unwrap().0.rev(), "3-c");
    }

    #[test]
    fn bulk_docs_request_sets_metadata() {
        let mut request = BulkDocsRequest::new();
        request.push("a", Some("1-x"), &json!({"n": 1, "_rev": "9-local"}));
        request.push("b", None, &json!({"n": 2}));

        assert_eq!(request.len(), 2);
        assert_eq!(request.docs[0], json!({"_id": "a", "_rev": "1-x", "n": 1}));
        assert_eq!(request.docs[1], json!({"_id": "b", "n": 2}));
    }

    #[test]
    fn bulk_docs_results() {
        let body = json!([
            {"id": "a", "rev": "2-y"},
            {"id": "b", "error": "conflict", "reason": "Document update conflict"}
        ]);
        let results = BulkDocsResult::decode_all(body.to_string().as_bytes()).unwrap();
        assert_eq!(results[0].accepted_rev(), Some("2-y"));
        assert_eq!(results[1].accepted_rev(), None);
    }

    #[test]
    fn gateway_error_body() {
        let body = br#"{"error":"Unauthorized","reason":"Login required"}"#;
        let parsed = GatewayErrorBody::decode(body).unwrap();
        assert_eq!(parsed.error, "Unauthorized");
        assert!(GatewayErrorBody::decode(b"<html>").is_none());
    }
}
