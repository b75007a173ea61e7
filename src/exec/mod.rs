//! Statement execution and result hydration.
//!
//! Runs generated query text through the transport, rehydrates raw rows
//! into [`Document`]s or [`Path`]s, resolves edge endpoints with point
//! follow-up queries, and applies the authorization and audit hooks to
//! every record read.

pub mod policy;

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::bql::codegen::Generator;
use crate::bql::filter::{BqlExpression, Predicate, ReturnShape};
use crate::bql::pipeline::{AggregateOp, SortKey, Step};
use crate::db::transport::{AqlQuery, Transport};
use crate::error::{BasaltError, Result};
use crate::model::{Document, Entity, ModelList, Path, PathEdge};
use crate::registry::{ModelKind, Registry};
use crate::types::RecordId;

pub use policy::{AccessPolicy, Action, AllowAll, AuditSink, DeniedReason, Identity, NullAudit};

/// Shape-dispatched result of a full query-expression run.
#[derive(Clone, Debug)]
pub enum QueryResult {
    /// Node-shaped results.
    Nodes(ModelList<Document>),
    /// Path-shaped results.
    Paths(Vec<Path>),
}

/// Runs statements and hydrates their results.
pub struct Executor<T: Transport> {
    transport: Arc<T>,
    registry: Arc<Registry>,
    policy: Arc<dyn AccessPolicy>,
    audit: Arc<dyn AuditSink>,
    identity: Identity,
}

impl<T: Transport> Executor<T> {
    /// Executor with permissive policy and no-op audit.
    pub fn new(transport: Arc<T>, registry: Arc<Registry>, identity: Identity) -> Self {
        Self {
            transport,
            registry,
            policy: Arc::new(AllowAll),
            audit: Arc::new(NullAudit),
            identity,
        }
    }

    /// Installs an authorization policy.
    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Installs an audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// The caller identity this executor authorizes as.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The registry this executor resolves model types against.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Runs a statement and hydrates node-shaped rows.
    pub fn fetch(&self, query: &AqlQuery) -> Result<Vec<Document>> {
        debug!(statement = %query.text, "executing query");
        let rows = self.transport.run(query)?;
        trace!(rows = rows.len(), "rows received");
        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let document = self.hydrate(row)?;
            documents.push(document);
        }
        self.authorize_and_audit(&documents)?;
        Ok(documents)
    }

    /// Runs a statement and decodes rows into a typed entity list.
    pub fn fetch_as<E: Entity>(&self, query: &AqlQuery) -> Result<Vec<E>> {
        self.fetch(query)?
            .into_iter()
            .map(E::from_document)
            .collect()
    }

    /// Runs a statement and hydrates path-shaped rows.
    pub fn fetch_paths(&self, query: &AqlQuery) -> Result<Vec<Path>> {
        debug!(statement = %query.text, "executing path query");
        let rows = self.transport.run(query)?;
        let mut paths = Vec::with_capacity(rows.len());
        for row in rows {
            paths.push(self.hydrate_path(row)?);
        }
        let mut all = Vec::new();
        for path in &paths {
            all.extend(path.nodes.iter().cloned());
            all.extend(path.edges.iter().map(|edge| edge.document.clone()));
        }
        self.authorize_and_audit(&all)?;
        Ok(paths)
    }

    /// Generates and runs an already-parsed step list end to end,
    /// dispatching on its return shape.
    pub fn run_steps(&self, steps: &[Step]) -> Result<QueryResult> {
        let shape = steps
            .iter()
            .find_map(|step| match step {
                Step::Return(shape) => Some(*shape),
                _ => None,
            })
            .ok_or(BasaltError::CodegenInvariant("missing terminal return step"))?;
        let offset = steps
            .iter()
            .find_map(|step| match step {
                Step::Limit { offset, .. } => Some(*offset),
                _ => None,
            })
            .unwrap_or(0);
        let query = Generator::new(&self.registry).generate(steps)?;
        match shape {
            ReturnShape::Nodes => Ok(QueryResult::Nodes(ModelList::new(
                self.fetch(&query)?,
                offset,
            ))),
            ReturnShape::Paths => Ok(QueryResult::Paths(self.fetch_paths(&query)?)),
        }
    }

    /// Runs a single converted expression under its own return descriptor.
    pub fn run_expression(&self, expression: &BqlExpression) -> Result<QueryResult> {
        let steps = vec![
            Step::Aggregate {
                op: AggregateOp::Union,
                source: expression.clone(),
            },
            Step::Return(expression.returns),
        ];
        self.run_steps(&steps)
    }

    /// Lists one model type through the plain list-predicate path.
    pub fn list(
        &self,
        type_name: &str,
        filter: Option<&Predicate>,
        sort: Option<&[SortKey]>,
        limit: Option<(u64, u64)>,
    ) -> Result<ModelList<Document>> {
        let query =
            Generator::new(&self.registry).generate_list(type_name, filter, sort, limit)?;
        let offset = limit.map(|(offset, _)| offset).unwrap_or(0);
        Ok(ModelList::new(self.fetch(&query)?, offset))
    }

    /// Point-fetches one record by id. `Ok(None)` when the record is gone.
    pub fn get(&self, record: &RecordId) -> Result<Option<Document>> {
        let rows = self.transport.run(&point_query(record))?;
        match rows.into_iter().next() {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let document = self.hydrate(value)?;
                self.authorize_and_audit(std::slice::from_ref(&document))?;
                Ok(Some(document))
            }
        }
    }

    /// Wraps a raw row and, for registered edge models, hydrates both
    /// endpoint documents with point follow-up queries.
    fn hydrate(&self, row: Value) -> Result<Document> {
        let document = Document::from_value(row)?;
        let is_edge = document
            .model_type()
            .and_then(|tag| self.registry.resolve(tag).ok())
            .map(|descriptor| descriptor.kind == ModelKind::Edge)
            .unwrap_or(false);
        if !is_edge {
            return Ok(document);
        }
        let from_id = document
            .from_id()
            .ok_or_else(|| BasaltError::Malformed("edge document missing _from".into()))?;
        let to_id = document
            .to_id()
            .ok_or_else(|| BasaltError::Malformed("edge document missing _to".into()))?;
        let from = self.point_fetch(&from_id)?;
        let to = self.point_fetch(&to_id)?;
        Ok(document.with_endpoints(from, to))
    }

    fn point_fetch(&self, record: &RecordId) -> Result<Document> {
        let rows = self.transport.run(&point_query(record))?;
        match rows.into_iter().next() {
            None | Some(Value::Null) => Err(BasaltError::NotFound("edge endpoint")),
            Some(value) => Document::from_value(value),
        }
    }

    /// Walks one raw path row: the row itself is the outermost vertex with
    /// `vertices`/`edges` pairing arrays attached; each edge is associated
    /// to its endpoints by id comparison.
    fn hydrate_path(&self, row: Value) -> Result<Path> {
        let mut fields = match row {
            Value::Object(fields) => fields,
            other => {
                return Err(BasaltError::Malformed(format!(
                    "expected a path document, got {other}"
                )))
            }
        };
        let vertices = take_array(&mut fields, "vertices")?;
        let edges = take_array(&mut fields, "edges")?;
        let root = Document::from_value(Value::Object(fields))?;

        let mut nodes = vertices
            .into_iter()
            .map(Document::from_value)
            .collect::<Result<Vec<_>>>()?;
        nodes.push(root.clone());

        let mut path_edges = Vec::new();
        for edge in edges {
            let document = Document::from_value(edge)?;
            let from = self.endpoint_index(&nodes, document.from_id());
            let to = self.endpoint_index(&nodes, document.to_id());
            path_edges.push(PathEdge { document, from, to });
        }
        Ok(Path {
            root,
            nodes,
            edges: path_edges,
        })
    }

    fn endpoint_index(&self, nodes: &[Document], id: Option<RecordId>) -> Option<usize> {
        let id = id?;
        nodes
            .iter()
            .position(|node| node.id().map(|node_id| node_id == id).unwrap_or(false))
    }

    fn authorize_and_audit(&self, documents: &[Document]) -> Result<()> {
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            self.policy
                .demand(&self.identity, document, Action::Read)
                .map_err(|denied| BasaltError::Denied(denied.0))?;
            if let Ok(id) = document.id() {
                ids.push(id);
            }
        }
        self.audit.record(&self.identity, &ids, Action::Read);
        Ok(())
    }
}

fn point_query(record: &RecordId) -> AqlQuery {
    AqlQuery::text("RETURN DOCUMENT(@id)").bind("id", json!(record.0))
}

fn take_array(
    fields: &mut serde_json::Map<String, Value>,
    key: &str,
) -> Result<Vec<Value>> {
    match fields.remove(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(BasaltError::Malformed(format!(
            "path field '{key}' is not an array: {other}"
        ))),
        None => Err(BasaltError::Malformed(format!(
            "path document missing '{key}' array"
        ))),
    }
}
