#![forbid(unsafe_code)]

//! Predicate rendering into filter fragments.
//!
//! Two entry points exist. [`render_list`] is the plain list-predicate path:
//! every member must resolve against the single model descriptor, and
//! connectives always render both sides. [`render_scoped`] is the
//! set-algebra path: a hop carries one combined predicate tree whose
//! comparisons may target either the hop's edge or its vertex, and the tree
//! is rendered once per scope. A comparison belonging to the other scope
//! renders to nothing; a connective with neither side rendered collapses to
//! nothing, and with one side rendered drops the connective and its
//! parentheses. This is what lets a single syntactic `and` straddle the two
//! query blocks the hop compiles into.
//!
//! Literal rendering is type-directed: strings are lower-cased and quoted
//! (with a matching `LOWER(..)` on the member) unless the member is one of
//! the store's identifier fields; datetimes normalize to UTC RFC 3339;
//! enums render their underlying numeric value.

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;

use crate::bql::errors::ParseError;
use crate::bql::filter::{CompareOp, Literal, Predicate};
use crate::error::{BasaltError, Result};
use crate::registry::{FieldKind, ModelDescriptor};

/// Which half of a hop a scoped rendering pass targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RenderScope {
    /// The edge block.
    Edge,
    /// The vertex block.
    Node,
}

/// Descriptor context of one hop, used for member-scope resolution.
#[derive(Clone, Copy, Debug)]
pub struct HopContext<'a> {
    /// Vertex descriptor of the hop.
    pub vertex: &'a ModelDescriptor,
    /// Edge descriptor, absent on any-edge segments and on the root.
    pub edge: Option<&'a ModelDescriptor>,
}

impl HopContext<'_> {
    fn matches_node(&self, member: &str) -> bool {
        matches!(member, "_key" | "_id") || self.vertex.fields.contains_key(member)
    }

    fn matches_edge(&self, member: &str) -> bool {
        matches!(member, "_from" | "_to")
            || self
                .edge
                .map(|edge| edge.fields.contains_key(member))
                .unwrap_or(false)
    }

    fn field_kind(&self, member: &str, scope: RenderScope) -> FieldKind {
        match member {
            "_key" | "_id" | "_from" | "_to" => FieldKind::Ref,
            _ => {
                let found = match scope {
                    RenderScope::Node => self.vertex.fields.get(member),
                    RenderScope::Edge => self.edge.and_then(|edge| edge.fields.get(member)),
                };
                found.copied().unwrap_or(FieldKind::Str)
            }
        }
    }
}

/// Renders a hop predicate for one scope. `Ok(None)` means nothing in the
/// tree targeted this scope.
pub fn render_scoped(
    predicate: &Predicate,
    alias: &str,
    scope: RenderScope,
    context: HopContext<'_>,
) -> Result<Option<String>> {
    match predicate {
        Predicate::Compare { op, member, value } => {
            let in_node = context.matches_node(member);
            let in_edge = context.matches_edge(member);
            if !in_node && !in_edge {
                return Err(ParseError::UnknownMember {
                    model: context.vertex.type_name.clone(),
                    member: member.clone(),
                }
                .into());
            }
            let matches_scope = match scope {
                RenderScope::Node => in_node,
                RenderScope::Edge => in_edge,
            };
            if !matches_scope {
                return Ok(None);
            }
            let kind = context.field_kind(member, scope);
            Ok(Some(render_comparison(*op, member, value, alias, kind)?))
        }
        Predicate::And { left, right } => Ok(join_scoped(
            render_scoped(left, alias, scope, context)?,
            render_scoped(right, alias, scope, context)?,
            "&&",
        )),
        Predicate::Or { left, right } => Ok(join_scoped(
            render_scoped(left, alias, scope, context)?,
            render_scoped(right, alias, scope, context)?,
            "||",
        )),
        Predicate::Scalar(_) | Predicate::DateFn { .. } => Err(BasaltError::CodegenInvariant(
            "value node is not a boolean predicate",
        )),
    }
}

/// Collapse rule for the scoped path: both sides render → parenthesized
/// connective; one side → that side bare; neither → nothing.
fn join_scoped(left: Option<String>, right: Option<String>, op: &str) -> Option<String> {
    match (left, right) {
        (Some(left), Some(right)) => Some(format!("({left} {op} {right})")),
        (Some(one), None) | (None, Some(one)) => Some(one),
        (None, None) => None,
    }
}

/// Renders a predicate against a single model descriptor. Every member must
/// resolve; connectives always render both sides.
pub fn render_list(
    predicate: &Predicate,
    alias: &str,
    descriptor: &ModelDescriptor,
) -> Result<String> {
    match predicate {
        Predicate::Compare { op, member, value } => {
            let kind = descriptor
                .field(member)
                .ok_or_else(|| ParseError::UnknownMember {
                    model: descriptor.type_name.clone(),
                    member: member.clone(),
                })?;
            render_comparison(*op, member, value, alias, kind)
        }
        Predicate::And { left, right } => Ok(format!(
            "({} && {})",
            render_list(left, alias, descriptor)?,
            render_list(right, alias, descriptor)?
        )),
        Predicate::Or { left, right } => Ok(format!(
            "({} || {})",
            render_list(left, alias, descriptor)?,
            render_list(right, alias, descriptor)?
        )),
        Predicate::Scalar(_) | Predicate::DateFn { .. } => Err(BasaltError::CodegenInvariant(
            "value node is not a boolean predicate",
        )),
    }
}

fn render_comparison(
    op: CompareOp,
    member: &str,
    value: &Predicate,
    alias: &str,
    kind: FieldKind,
) -> Result<String> {
    // Case-insensitive string handling applies to string literals on
    // ordinary members; identifier references compare verbatim.
    let fold_case = kind != FieldKind::Ref && value_is_str(value);
    let lhs = if fold_case {
        format!("LOWER({alias}.{member})")
    } else {
        format!("{alias}.{member}")
    };
    let rhs = render_value(value, fold_case)?;
    Ok(match op {
        CompareOp::Eq => format!("{lhs} == {rhs}"),
        CompareOp::Neq => format!("{lhs} != {rhs}"),
        CompareOp::Gt => format!("{lhs} > {rhs}"),
        CompareOp::Gte => format!("{lhs} >= {rhs}"),
        CompareOp::Lt => format!("{lhs} < {rhs}"),
        CompareOp::Lte => format!("{lhs} <= {rhs}"),
        CompareOp::Contains => format!("CONTAINS({lhs}, {rhs})"),
        CompareOp::StartsWith => format!("STARTS_WITH({lhs}, {rhs})"),
    })
}

fn value_is_str(value: &Predicate) -> bool {
    matches!(value, Predicate::Scalar(Literal::Str(_)))
}

/// Renders a value operand: a scalar literal or a date function call.
fn render_value(value: &Predicate, fold_case: bool) -> Result<String> {
    match value {
        Predicate::Scalar(literal) => literal_text(literal, fold_case),
        Predicate::DateFn { name, args } => {
            let args = args
                .iter()
                .map(|arg| render_value(arg, false))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("{name}({})", args.join(", ")))
        }
        _ => Err(BasaltError::CodegenInvariant(
            "comparison operand is not a value node",
        )),
    }
}

fn literal_text(literal: &Literal, fold_case: bool) -> Result<String> {
    Ok(match literal {
        Literal::Str(s) => {
            if fold_case {
                quote_str(&s.to_lowercase())
            } else {
                quote_str(s)
            }
        }
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::DateTime(dt) => {
            let utc = dt.to_offset(UtcOffset::UTC);
            let text = utc
                .format(&Rfc3339)
                .map_err(|_| BasaltError::CodegenInvariant("unrepresentable datetime literal"))?;
            quote_str(&text)
        }
        Literal::Enum { value, .. } => value.to_string(),
    })
}

/// Escapes and single-quotes a string literal. All literal escaping funnels
/// through here.
pub fn quote_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}
