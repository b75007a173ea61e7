//! Static model registry bridging BQL type names to storage metadata.
//!
//! The converter and the predicate renderer both resolve names through this
//! registry instead of performing runtime type lookups: every model type the
//! deployment knows about is described once at startup, and resolution
//! failures become typed [`ParseError`]s rather than panics.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::bql::errors::ParseError;

/// Whether a model lives in a vertex or an edge collection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModelKind {
    /// Document stored in a vertex collection.
    Vertex,
    /// Document stored in an edge collection (`_from`/`_to` bearing).
    Edge,
}

/// Semantic type of a declared model field, consulted when rendering
/// comparison literals.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// UTF-8 string; compared case-insensitively.
    Str,
    /// Integer or float.
    Number,
    /// Boolean.
    Bool,
    /// Timestamp; rendered as UTC RFC 3339 text.
    DateTime,
    /// Enumeration; rendered as its underlying numeric value.
    Enum,
    /// Reference to another record (`_id`-shaped); compared verbatim.
    Ref,
}

/// Description of one registered model type.
#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    /// Type tag as it appears in BQL and in each document's `ModelType`.
    pub type_name: String,
    /// Backing collection name.
    pub collection: String,
    /// Vertex or edge.
    pub kind: ModelKind,
    /// Declared fields and their semantic types.
    pub fields: FxHashMap<String, FieldKind>,
}

impl ModelDescriptor {
    /// Looks up a member, treating the store's identifier fields as always
    /// present. `_from`/`_to` only exist on edge documents.
    pub fn field(&self, member: &str) -> Option<FieldKind> {
        match member {
            "_key" | "_id" => Some(FieldKind::Ref),
            "_from" | "_to" => match self.kind {
                ModelKind::Edge => Some(FieldKind::Ref),
                ModelKind::Vertex => None,
            },
            other => self.fields.get(other).copied(),
        }
    }
}

/// Startup-validated mapping from type tags to descriptors, plus the
/// deployment-wide collection naming the compiler depends on.
#[derive(Clone, Debug)]
pub struct Registry {
    models: FxHashMap<String, Arc<ModelDescriptor>>,
    any_edge_collection: String,
    ownership_collection: String,
    ownership_edge_type: String,
    lock_collection: String,
    override_collection: String,
}

impl Registry {
    /// Starts a registry builder with default protocol collection names.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Resolves a type tag to its descriptor.
    pub fn resolve(&self, type_name: &str) -> Result<&Arc<ModelDescriptor>, ParseError> {
        self.models
            .get(type_name)
            .ok_or_else(|| ParseError::UnknownType(type_name.to_owned()))
    }

    /// Collection scanned when a traversal segment names no edge type.
    pub fn any_edge_collection(&self) -> &str {
        &self.any_edge_collection
    }

    /// Collection holding ownership edges (organizational unit → record).
    pub fn ownership_collection(&self) -> &str {
        &self.ownership_collection
    }

    /// `ModelType` tag carried by ownership edges.
    pub fn ownership_edge_type(&self) -> &str {
        &self.ownership_edge_type
    }

    /// Collection holding lock records.
    pub fn lock_collection(&self) -> &str {
        &self.lock_collection
    }

    /// Collection holding queue override records.
    pub fn override_collection(&self) -> &str {
        &self.override_collection
    }
}

/// Chainable registry construction; `build` validates the accumulated set.
#[derive(Debug)]
pub struct RegistryBuilder {
    models: Vec<ModelDescriptor>,
    any_edge_collection: String,
    ownership_collection: String,
    ownership_edge_type: String,
    lock_collection: String,
    override_collection: String,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            any_edge_collection: "relations".to_owned(),
            ownership_collection: "ownership".to_owned(),
            ownership_edge_type: "ownedBy".to_owned(),
            lock_collection: "locks".to_owned(),
            override_collection: "queueOverrides".to_owned(),
        }
    }
}

impl RegistryBuilder {
    /// Registers a vertex model type.
    pub fn vertex<N, C>(self, type_name: N, collection: C, fields: &[(&str, FieldKind)]) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        self.model(type_name, collection, ModelKind::Vertex, fields)
    }

    /// Registers an edge model type.
    pub fn edge<N, C>(self, type_name: N, collection: C, fields: &[(&str, FieldKind)]) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        self.model(type_name, collection, ModelKind::Edge, fields)
    }

    fn model<N, C>(
        mut self,
        type_name: N,
        collection: C,
        kind: ModelKind,
        fields: &[(&str, FieldKind)],
    ) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        self.models.push(ModelDescriptor {
            type_name: type_name.into(),
            collection: collection.into(),
            kind,
            fields: fields
                .iter()
                .map(|(name, kind)| ((*name).to_owned(), *kind))
                .collect(),
        });
        self
    }

    /// Overrides the catch-all edge collection name.
    pub fn any_edge_collection(mut self, name: impl Into<String>) -> Self {
        self.any_edge_collection = name.into();
        self
    }

    /// Overrides the ownership edge collection and type tag.
    pub fn ownership(mut self, collection: impl Into<String>, edge_type: impl Into<String>) -> Self {
        self.ownership_collection = collection.into();
        self.ownership_edge_type = edge_type.into();
        self
    }

    /// Overrides the lock record collection name.
    pub fn lock_collection(mut self, name: impl Into<String>) -> Self {
        self.lock_collection = name.into();
        self
    }

    /// Overrides the queue override collection name.
    pub fn override_collection(mut self, name: impl Into<String>) -> Self {
        self.override_collection = name.into();
        self
    }

    /// Validates the accumulated descriptors and produces the registry.
    pub fn build(self) -> Result<Registry, ParseError> {
        let mut models = FxHashMap::default();
        for descriptor in self.models {
            let name = descriptor.type_name.clone();
            if models.insert(name.clone(), Arc::new(descriptor)).is_some() {
                return Err(ParseError::DuplicateType(name));
            }
        }
        Ok(Registry {
            models,
            any_edge_collection: self.any_edge_collection,
            ownership_collection: self.ownership_collection,
            ownership_edge_type: self.ownership_edge_type,
            lock_collection: self.lock_collection,
            override_collection: self.override_collection,
        })
    }
}
