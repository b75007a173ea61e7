#![forbid(unsafe_code)]

//! Join-query pipeline: parses a query expression into an ordered step
//! list.
//!
//! Scanning the flat child-token list is a small state machine:
//! `Start → InAggregate → (aggregator) → InAggregate → … → [Sort] →
//! [Limit] → Return`. Aggregator tokens close the in-progress aggregate and
//! open the next; a sort or limit token force-closes the aggregate phase.
//! A missing terminal return selector defaults to nodes.

use crate::bql::convert::convert_traversal;
use crate::bql::errors::ParseError;
use crate::bql::filter::{BqlExpression, ReturnShape};
use crate::bql::syntax::{QuerySyntax, QueryToken, SortKeySyntax};
use crate::registry::Registry;

/// Set operator combining one aggregate step with the accumulated result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregateOp {
    /// Set union, duplicates removed.
    Union,
    /// Set intersection.
    Intersect,
    /// Set difference.
    Exclude,
}

/// One sort key of a sort step.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    /// Member name on the returned records.
    pub member: String,
    /// Sort descending when set.
    pub descending: bool,
}

/// One stage of a parsed query expression.
///
/// Invariants: a step list is never empty, starts with an aggregate, holds
/// at most one sort and one limit, and terminates in exactly one return.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// One traversal fragment plus the operator combining it leftward.
    Aggregate {
        /// Combining operator; ignored on the first aggregate.
        op: AggregateOp,
        /// Lowered traversal fragment.
        source: BqlExpression,
    },
    /// Sort clause.
    Sort(Vec<SortKey>),
    /// Limit clause.
    Limit {
        /// Records to skip.
        offset: u64,
        /// Records to return.
        count: u64,
    },
    /// Terminal return-shape selector.
    Return(ReturnShape),
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Phase {
    Aggregates,
    Sorted,
    Limited,
    Returned,
}

/// Parses a query expression into its step list.
pub fn parse_query(syntax: &QuerySyntax, registry: &Registry) -> Result<Vec<Step>, ParseError> {
    let mut steps = Vec::new();
    let mut phase = Phase::Aggregates;
    // `None` means the previous traversal has not been followed by an
    // aggregator yet; `Some` means an aggregator is waiting for its
    // right-hand traversal.
    let mut pending: Option<(AggregateOp, String)> = Some((AggregateOp::Union, String::new()));

    for token in &syntax.tokens {
        match token {
            QueryToken::Traversal(traversal) => {
                if phase != Phase::Aggregates {
                    return Err(ParseError::UnexpectedToken("traversal"));
                }
                let (op, _) = pending
                    .take()
                    .ok_or(ParseError::UnexpectedToken("traversal"))?;
                steps.push(Step::Aggregate {
                    op,
                    source: convert_traversal(traversal, registry)?,
                });
            }
            QueryToken::Aggregator(token) => {
                if phase != Phase::Aggregates || steps.is_empty() {
                    return Err(ParseError::UnexpectedToken("aggregator"));
                }
                if let Some((_, dangling)) = pending {
                    return Err(ParseError::DanglingAggregator(dangling));
                }
                pending = Some((parse_aggregator(token)?, token.clone()));
            }
            QueryToken::Sort(keys) => {
                close_aggregates(&pending)?;
                pending = None;
                if phase != Phase::Aggregates {
                    return Err(ParseError::UnexpectedToken("sort"));
                }
                phase = Phase::Sorted;
                steps.push(Step::Sort(convert_sort(keys)));
            }
            QueryToken::Limit { offset, count } => {
                close_aggregates(&pending)?;
                pending = None;
                if phase != Phase::Aggregates && phase != Phase::Sorted {
                    return Err(ParseError::UnexpectedToken("limit"));
                }
                phase = Phase::Limited;
                steps.push(Step::Limit {
                    offset: *offset,
                    count: *count,
                });
            }
            QueryToken::ReturnPaths(paths) => {
                close_aggregates(&pending)?;
                pending = None;
                if phase == Phase::Returned {
                    return Err(ParseError::UnexpectedToken("return"));
                }
                phase = Phase::Returned;
                steps.push(Step::Return(if *paths {
                    ReturnShape::Paths
                } else {
                    ReturnShape::Nodes
                }));
            }
        }
    }

    if let Some((_, dangling)) = pending {
        if !dangling.is_empty() {
            return Err(ParseError::DanglingAggregator(dangling));
        }
    }
    if !matches!(steps.first(), Some(Step::Aggregate { .. })) {
        return Err(ParseError::EmptyQuery);
    }
    if phase != Phase::Returned {
        steps.push(Step::Return(ReturnShape::default()));
    }
    Ok(steps)
}

/// A pending aggregator at a phase boundary means the aggregator never got
/// its right-hand traversal.
fn close_aggregates(pending: &Option<(AggregateOp, String)>) -> Result<(), ParseError> {
    if let Some((_, dangling)) = pending {
        if !dangling.is_empty() {
            return Err(ParseError::DanglingAggregator(dangling.clone()));
        }
    }
    Ok(())
}

fn parse_aggregator(token: &str) -> Result<AggregateOp, ParseError> {
    match token.to_ascii_uppercase().as_str() {
        "UNION" => Ok(AggregateOp::Union),
        "INTERSECT" => Ok(AggregateOp::Intersect),
        "EXCLUDE" => Ok(AggregateOp::Exclude),
        _ => Err(ParseError::UnsupportedOperator(token.to_owned())),
    }
}

fn convert_sort(keys: &[SortKeySyntax]) -> Vec<SortKey> {
    keys.iter()
        .map(|key| SortKey {
            member: key.member.clone(),
            descending: key.descending,
        })
        .collect()
}
