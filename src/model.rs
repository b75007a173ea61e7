//! Runtime model representations: raw documents, traversal paths, and the
//! persisted shapes of the lock and queue-override protocols.

use std::fmt;

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::{BasaltError, Result};
use crate::types::{RecordId, SessionId};

/// Reserved document field carrying the model type tag.
pub const MODEL_TYPE_FIELD: &str = "ModelType";
/// Reserved document field carrying the soft-delete flag.
pub const IS_DELETED_FIELD: &str = "IsDeleted";

/// A raw database document wrapped with typed accessors.
///
/// This is the open-union model: when the caller does not know a static type
/// for a result set, every record is one of these, discriminated by
/// [`MODEL_TYPE_FIELD`]. Edge documents additionally carry hydrated endpoint
/// documents once the executor has resolved them.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    fields: Map<String, Value>,
    endpoints: Option<Box<Endpoints>>,
}

/// Hydrated `_from`/`_to` endpoints of an edge document.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoints {
    /// Document referenced by `_from`.
    pub from: Document,
    /// Document referenced by `_to`.
    pub to: Document,
}

impl Document {
    /// Wraps a raw JSON object; anything else is a malformed result row.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                endpoints: None,
            }),
            other => Err(BasaltError::Malformed(format!(
                "expected a document object, got {other}"
            ))),
        }
    }

    /// Raw field access.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String field access.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// The document's `_id`, required on every persisted record.
    pub fn id(&self) -> Result<RecordId> {
        self.get_str("_id")
            .map(|id| RecordId(id.to_owned()))
            .ok_or_else(|| BasaltError::Malformed("document missing _id".into()))
    }

    /// The document's `_key`, when present.
    pub fn key(&self) -> Option<&str> {
        self.get_str("_key")
    }

    /// Model type tag, when present.
    pub fn model_type(&self) -> Option<&str> {
        self.get_str(MODEL_TYPE_FIELD)
    }

    /// Soft-delete flag; absent means live.
    pub fn is_deleted(&self) -> bool {
        self.get(IS_DELETED_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// `_from` reference of an edge document.
    pub fn from_id(&self) -> Option<RecordId> {
        self.get_str("_from").map(|id| RecordId(id.to_owned()))
    }

    /// `_to` reference of an edge document.
    pub fn to_id(&self) -> Option<RecordId> {
        self.get_str("_to").map(|id| RecordId(id.to_owned()))
    }

    /// Hydrated endpoints, when the executor has resolved them.
    pub fn endpoints(&self) -> Option<&Endpoints> {
        self.endpoints.as_deref()
    }

    /// Attaches hydrated endpoint documents.
    pub fn with_endpoints(mut self, from: Document, to: Document) -> Self {
        self.endpoints = Some(Box::new(Endpoints { from, to }));
        self
    }

    /// Underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the wrapper, yielding the raw field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_str("_id") {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "<unsaved document>"),
        }
    }
}

/// Typed-decode seam for user model structs.
///
/// Model instantiation machinery is a collaborator concern; this trait is the
/// boundary it plugs into. The open-union [`Document`] implements it
/// trivially so untyped reads flow through the same code path.
pub trait Entity: Sized {
    /// Decodes one hydrated document into the implementing type.
    fn from_document(document: Document) -> Result<Self>;
}

impl Entity for Document {
    fn from_document(document: Document) -> Result<Self> {
        Ok(document)
    }
}

/// A paged result window.
#[derive(Clone, Debug, Default)]
pub struct ModelList<T> {
    /// Records in this page.
    pub items: Vec<T>,
    /// Offset of the first record within the full result.
    pub offset: u64,
}

impl<T> ModelList<T> {
    /// Wraps a page of records.
    pub fn new(items: Vec<T>, offset: u64) -> Self {
        Self { items, offset }
    }

    /// Number of records in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the page is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One edge inside a [`Path`], with its endpoints resolved to node indices
/// by id comparison.
#[derive(Clone, Debug)]
pub struct PathEdge {
    /// The edge document.
    pub document: Document,
    /// Index into [`Path::nodes`] of the `_from` endpoint, when matched.
    pub from: Option<usize>,
    /// Index into [`Path::nodes`] of the `_to` endpoint, when matched.
    pub to: Option<usize>,
}

/// A fully hydrated traversal path.
#[derive(Clone, Debug)]
pub struct Path {
    /// The outermost matched vertex.
    pub root: Document,
    /// Every vertex on the path, outermost last.
    pub nodes: Vec<Document>,
    /// Every edge on the path, endpoint-associated.
    pub edges: Vec<PathEdge>,
}

/// Parsed lock record (persisted shape: `{_from, _to, ModelType: "Lock",
/// Expires, SecuritySessionId, IsDeleted}`).
#[derive(Clone, Debug, PartialEq)]
pub struct LockRecord {
    /// Holder identity record id.
    pub holder: RecordId,
    /// Locked record id.
    pub target: RecordId,
    /// Session the lock is scoped to.
    pub session: SessionId,
    /// Expiry instant.
    pub expires: OffsetDateTime,
}

impl LockRecord {
    /// `ModelType` tag of lock records.
    pub const MODEL_TYPE: &'static str = "Lock";

    /// Parses a lock document returned by the store.
    pub fn from_document(document: &Document) -> Result<Self> {
        let expires_ms = document
            .get("Expires")
            .and_then(Value::as_i64)
            .ok_or_else(|| BasaltError::Malformed("lock record missing Expires".into()))?;
        let expires = OffsetDateTime::from_unix_timestamp_nanos(i128::from(expires_ms) * 1_000_000)
            .map_err(|err| BasaltError::Malformed(format!("lock Expires out of range: {err}")))?;
        let holder = document
            .from_id()
            .ok_or_else(|| BasaltError::Malformed("lock record missing _from".into()))?;
        let target = document
            .to_id()
            .ok_or_else(|| BasaltError::Malformed("lock record missing _to".into()))?;
        let session = document
            .get_str("SecuritySessionId")
            .map(|s| SessionId(s.to_owned()))
            .ok_or_else(|| {
                BasaltError::Malformed("lock record missing SecuritySessionId".into())
            })?;
        Ok(Self {
            holder,
            target,
            session,
            expires,
        })
    }

    /// Whether the lock is still live at `now`.
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.expires > now
    }
}

/// Parsed queue-override record (persisted shape: `{_from, _to, ModelType:
/// "queueOverrides", ForcedRank, IsOnHold}`). Absent override implies the
/// default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueOverride {
    /// Operator-forced rank; dominates the member query's declared rank.
    pub forced_rank: i64,
    /// Whether the candidate is suppressed from selection.
    pub is_on_hold: bool,
}

impl QueueOverride {
    /// `ModelType` tag of queue override records.
    pub const MODEL_TYPE: &'static str = "queueOverrides";
}
