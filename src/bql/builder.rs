#![forbid(unsafe_code)]

//! Fluent builder for programmatic query construction.
//!
//! Produces the same [`QuerySyntax`] shape the BQL parser hands over, so
//! callers (and tests) can assemble traversals without writing raw syntax
//! nodes. Errors are deferred: the first misuse poisons the builder and
//! surfaces at `finish`.

use crate::bql::errors::ParseError;
use crate::bql::syntax::{
    DirectionSyntax, EdgeSyntax, FilterSyntax, LinkSyntax, QuerySyntax, QueryToken,
    SelectionSyntax, SortKeySyntax, TraversalSyntax, VertexSyntax,
};

/// Fluent query-expression builder.
#[derive(Default)]
pub struct BqlBuilder {
    tokens: Vec<QueryToken>,
    current: Option<TraversalSyntax>,
    pending_link: Option<LinkSyntax>,
    sort_keys: Vec<SortKeySyntax>,
    error: Option<ParseError>,
}

impl BqlBuilder {
    /// Starts an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder with the given root vertex accessor.
    pub fn traverse(type_name: impl Into<String>) -> Self {
        Self::new().vertex(type_name)
    }

    /// Appends a vertex accessor: the traversal root, or the target of the
    /// pending link.
    pub fn vertex(mut self, type_name: impl Into<String>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let accessor = VertexSyntax::new(type_name);
        if let Some(link) = self.pending_link.take() {
            match &mut self.current {
                Some(current) => current.segments.push((link, accessor)),
                None => self.error = Some(ParseError::UnexpectedToken("link")),
            }
        } else if self.current.is_none() {
            self.current = Some(TraversalSyntax {
                root: accessor,
                segments: vec![],
            });
        } else {
            self.error = Some(ParseError::UnexpectedToken("vertex"));
        }
        self
    }

    /// Attaches an inline filter to the most recent accessor (the pending
    /// edge if one is open, otherwise the last vertex).
    pub fn filter(mut self, filter: FilterSyntax) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Some(link) = &mut self.pending_link {
            match link {
                LinkSyntax::Edge(edge) => {
                    edge.filter = Some(match edge.filter.take() {
                        Some(existing) => existing.and(filter),
                        None => filter,
                    });
                }
                // Shorthand links carry no filter position.
                _ => self.error = Some(ParseError::UnexpectedToken("filter")),
            }
            return self;
        }
        let Some(current) = &mut self.current else {
            self.error = Some(ParseError::UnexpectedToken("filter"));
            return self;
        };
        let target = match current.segments.last_mut() {
            Some((_, vertex)) => vertex,
            None => &mut current.root,
        };
        target.filter = Some(match target.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Opens an outbound edge accessor toward the next vertex.
    pub fn edge_out(self, edge_type: impl Into<String>) -> Self {
        self.edge(edge_type, DirectionSyntax::Out, SelectionSyntax::Inclusive)
    }

    /// Opens an inbound edge accessor toward the next vertex.
    pub fn edge_in(self, edge_type: impl Into<String>) -> Self {
        self.edge(edge_type, DirectionSyntax::In, SelectionSyntax::Inclusive)
    }

    /// Opens a typed edge accessor with explicit direction and selection.
    pub fn edge(
        mut self,
        edge_type: impl Into<String>,
        direction: DirectionSyntax,
        selection: SelectionSyntax,
    ) -> Self {
        self.link(LinkSyntax::Edge(EdgeSyntax {
            edge_type: Some(edge_type.into()),
            direction,
            selection,
            filter: None,
        }));
        self
    }

    /// `out` shorthand link.
    pub fn out(mut self) -> Self {
        self.link(LinkSyntax::Out);
        self
    }

    /// `in` shorthand link.
    pub fn r#in(mut self) -> Self {
        self.link(LinkSyntax::In);
        self
    }

    /// `not-out` shorthand link.
    pub fn not_out(mut self) -> Self {
        self.link(LinkSyntax::NotOut);
        self
    }

    /// `not-in` shorthand link.
    pub fn not_in(mut self) -> Self {
        self.link(LinkSyntax::NotIn);
        self
    }

    /// `optional-out` shorthand link.
    pub fn optional_out(mut self) -> Self {
        self.link(LinkSyntax::OptionalOut);
        self
    }

    /// `optional-in` shorthand link.
    pub fn optional_in(mut self) -> Self {
        self.link(LinkSyntax::OptionalIn);
        self
    }

    fn link(&mut self, link: LinkSyntax) {
        if self.error.is_some() {
            return;
        }
        if self.current.is_none() || self.pending_link.is_some() {
            self.error = Some(ParseError::UnexpectedToken("link"));
            return;
        }
        self.pending_link = Some(link);
    }

    /// Closes the current traversal and opens the next under `UNION`.
    pub fn union(self) -> Self {
        self.aggregator("UNION")
    }

    /// Closes the current traversal and opens the next under `INTERSECT`.
    pub fn intersect(self) -> Self {
        self.aggregator("INTERSECT")
    }

    /// Closes the current traversal and opens the next under `EXCLUDE`.
    pub fn exclude(self) -> Self {
        self.aggregator("EXCLUDE")
    }

    fn aggregator(mut self, token: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        if !self.close_traversal() {
            self.error = Some(ParseError::DanglingAggregator(token.to_owned()));
            return self;
        }
        self.tokens.push(QueryToken::Aggregator(token.to_owned()));
        self
    }

    /// Adds one sort key; consecutive keys merge into one sort clause.
    pub fn sort(mut self, member: impl Into<String>, descending: bool) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.close_traversal();
        self.sort_keys.push(SortKeySyntax {
            member: member.into(),
            descending,
        });
        self
    }

    /// Adds a limit clause.
    pub fn limit(mut self, offset: u64, count: u64) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.close_traversal();
        self.flush_sort();
        self.tokens.push(QueryToken::Limit { offset, count });
        self
    }

    /// Requests path-shaped results.
    pub fn return_paths(mut self) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.close_traversal();
        self.flush_sort();
        self.tokens.push(QueryToken::ReturnPaths(true));
        self
    }

    /// Requests node-shaped results explicitly.
    pub fn return_nodes(mut self) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.close_traversal();
        self.flush_sort();
        self.tokens.push(QueryToken::ReturnPaths(false));
        self
    }

    fn close_traversal(&mut self) -> bool {
        if self.pending_link.is_some() {
            self.error = Some(ParseError::UnexpectedToken("link"));
            return false;
        }
        match self.current.take() {
            Some(traversal) => {
                self.tokens.push(QueryToken::Traversal(traversal));
                true
            }
            None => false,
        }
    }

    fn flush_sort(&mut self) {
        if !self.sort_keys.is_empty() {
            let keys = std::mem::take(&mut self.sort_keys);
            self.tokens.push(QueryToken::Sort(keys));
        }
    }

    /// Finishes the builder, yielding the query expression.
    pub fn finish(mut self) -> Result<QuerySyntax, ParseError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.close_traversal();
        self.flush_sort();
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(QuerySyntax {
            tokens: self.tokens,
        })
    }

    /// Finishes a single-fragment builder, yielding just the traversal.
    pub fn traversal(self) -> Result<TraversalSyntax, ParseError> {
        let mut query = self.finish()?;
        match (query.tokens.len(), query.tokens.pop()) {
            (1, Some(QueryToken::Traversal(traversal))) => Ok(traversal),
            _ => Err(ParseError::UnexpectedToken("query")),
        }
    }
}
