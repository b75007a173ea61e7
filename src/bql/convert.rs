#![forbid(unsafe_code)]

//! BQL syntax-tree to filter-IR conversion.
//!
//! Walks a traversal fragment left to right, resolving vertex and edge type
//! names against the registry and consing one hop per segment onto the chain
//! built so far. Shorthand links (`in`, `out`, `not-in`, `not-out`,
//! `optional-in`, `optional-out`) are rewritten into synthetic any-edge
//! accessors first, so everything downstream sees a single edge-accessor
//! shape.

use crate::bql::errors::ParseError;
use crate::bql::filter::{
    BqlExpression, CompareOp, Direction, EdgeSelection, Hop, HopArena, Literal, Predicate,
    ReturnShape,
};
use crate::bql::syntax::{
    DirectionSyntax, EdgeSyntax, FilterSyntax, LinkSyntax, LiteralSyntax, SelectionSyntax,
    TraversalSyntax,
};
use crate::registry::{ModelKind, Registry};

/// Converts one traversal fragment into IR.
pub fn convert_traversal(
    syntax: &TraversalSyntax,
    registry: &Registry,
) -> Result<BqlExpression, ParseError> {
    let root_type = resolve_vertex(&syntax.root.type_name, registry)?;
    let mut arena = HopArena::new();
    let root_filter = syntax
        .root
        .filter
        .as_ref()
        .map(convert_filter)
        .transpose()?;
    let mut leaf = arena.push(Hop {
        vertex_type: root_type.clone(),
        edge_type: None,
        direction: Direction::Out,
        selection: EdgeSelection::Inclusive,
        filter: root_filter,
        parent: None,
    });

    for (link, vertex) in &syntax.segments {
        let edge = normalize_link(link);
        let vertex_type = resolve_vertex(&vertex.type_name, registry)?;
        if let Some(name) = &edge.edge_type {
            let descriptor = registry.resolve(name)?;
            if descriptor.kind != ModelKind::Edge {
                return Err(ParseError::KindMismatch {
                    model: name.clone(),
                    expected: "edge",
                });
            }
        }
        let filter = merge_filters(edge.filter.as_ref(), vertex.filter.as_ref())?;
        leaf = arena.push(Hop {
            vertex_type,
            edge_type: edge.edge_type.clone(),
            direction: convert_direction(edge.direction),
            selection: convert_selection(edge.selection),
            filter,
            parent: Some(leaf),
        });
    }

    Ok(BqlExpression {
        root_type,
        arena,
        leaf,
        returns: ReturnShape::Nodes,
    })
}

/// Converts one inline filter expression into a predicate tree.
///
/// Operator tokens map 1:1; no type coercion happens here — type-sensitive
/// formatting is deferred to the renderer.
pub fn convert_filter(syntax: &FilterSyntax) -> Result<Predicate, ParseError> {
    match syntax {
        FilterSyntax::Compare { member, op, value } => Ok(Predicate::compare(
            convert_compare_op(op)?,
            member.clone(),
            convert_literal(value),
        )),
        FilterSyntax::Link { left, op, right } => {
            let left = convert_filter(left)?;
            let right = convert_filter(right)?;
            match op.to_ascii_lowercase().as_str() {
                "and" => Ok(Predicate::and(left, right)),
                "or" => Ok(Predicate::or(left, right)),
                _ => Err(ParseError::UnsupportedOperator(op.clone())),
            }
        }
    }
}

fn resolve_vertex(type_name: &str, registry: &Registry) -> Result<String, ParseError> {
    let descriptor = registry.resolve(type_name)?;
    if descriptor.kind != ModelKind::Vertex {
        return Err(ParseError::KindMismatch {
            model: type_name.to_owned(),
            expected: "vertex",
        });
    }
    Ok(descriptor.type_name.clone())
}

/// Rewrites shorthand links into synthetic any-edge accessors.
fn normalize_link(link: &LinkSyntax) -> EdgeSyntax {
    let shorthand = |direction, selection| EdgeSyntax {
        edge_type: None,
        direction,
        selection,
        filter: None,
    };
    match link {
        LinkSyntax::Edge(edge) => edge.clone(),
        LinkSyntax::Out => shorthand(DirectionSyntax::Out, SelectionSyntax::Inclusive),
        LinkSyntax::In => shorthand(DirectionSyntax::In, SelectionSyntax::Inclusive),
        LinkSyntax::NotOut => shorthand(DirectionSyntax::Out, SelectionSyntax::Exclusive),
        LinkSyntax::NotIn => shorthand(DirectionSyntax::In, SelectionSyntax::Exclusive),
        LinkSyntax::OptionalOut => {
            shorthand(DirectionSyntax::Out, SelectionSyntax::OptionalInclusive)
        }
        LinkSyntax::OptionalIn => {
            shorthand(DirectionSyntax::In, SelectionSyntax::OptionalInclusive)
        }
    }
}

/// Conjoins a segment's edge and vertex inline filters into the hop's single
/// predicate tree. The renderer splits them apart again by member scope.
fn merge_filters(
    edge: Option<&FilterSyntax>,
    vertex: Option<&FilterSyntax>,
) -> Result<Option<Predicate>, ParseError> {
    let edge = edge.map(convert_filter).transpose()?;
    let vertex = vertex.map(convert_filter).transpose()?;
    Ok(match (edge, vertex) {
        (Some(e), Some(v)) => Some(Predicate::and(e, v)),
        (Some(e), None) => Some(e),
        (None, Some(v)) => Some(v),
        (None, None) => None,
    })
}

fn convert_compare_op(token: &str) -> Result<CompareOp, ParseError> {
    match token.to_ascii_lowercase().as_str() {
        "=" => Ok(CompareOp::Eq),
        "!=" => Ok(CompareOp::Neq),
        ">" => Ok(CompareOp::Gt),
        ">=" => Ok(CompareOp::Gte),
        "<" => Ok(CompareOp::Lt),
        "<=" => Ok(CompareOp::Lte),
        "contains" => Ok(CompareOp::Contains),
        "startswith" => Ok(CompareOp::StartsWith),
        _ => Err(ParseError::UnsupportedOperator(token.to_owned())),
    }
}

fn convert_direction(direction: DirectionSyntax) -> Direction {
    match direction {
        DirectionSyntax::Out => Direction::Out,
        DirectionSyntax::In => Direction::In,
    }
}

fn convert_selection(selection: SelectionSyntax) -> EdgeSelection {
    match selection {
        SelectionSyntax::Inclusive => EdgeSelection::Inclusive,
        SelectionSyntax::Exclusive => EdgeSelection::Exclusive,
        SelectionSyntax::OptionalInclusive => EdgeSelection::OptionalInclusive,
    }
}

fn convert_literal(literal: &LiteralSyntax) -> Literal {
    match literal {
        LiteralSyntax::Str(s) => Literal::Str(s.clone()),
        LiteralSyntax::Int(i) => Literal::Int(*i),
        LiteralSyntax::Float(f) => Literal::Float(*f),
        LiteralSyntax::Bool(b) => Literal::Bool(*b),
        LiteralSyntax::DateTime(dt) => Literal::DateTime(*dt),
        LiteralSyntax::Enum { name, value } => Literal::Enum {
            name: name.clone(),
            value: *value,
        },
    }
}
