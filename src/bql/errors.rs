#![forbid(unsafe_code)]

use thiserror::Error;

/// Structured errors emitted by the BQL front-end.
///
/// Every variant is a hard rejection: the converter and pipeline never fall
/// back to a silent default when a name or operator fails to resolve.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Referenced model type is absent from the registry.
    #[error("unknown model type '{0}'")]
    UnknownType(String),
    /// Referenced member is not declared on the model type.
    #[error("unknown member '{member}' on model type '{model}'")]
    UnknownMember {
        /// Owning model type tag.
        model: String,
        /// Member name as written.
        member: String,
    },
    /// Comparison or boolean operator token was not recognized.
    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),
    /// A query expression contained no traversal fragment.
    #[error("query requires at least one traversal fragment")]
    EmptyQuery,
    /// An aggregator token appeared without a following traversal.
    #[error("aggregator '{0}' is missing its right-hand traversal")]
    DanglingAggregator(String),
    /// A query-expression token appeared out of order.
    #[error("unexpected {0} token in query expression")]
    UnexpectedToken(&'static str),
    /// A model type was registered twice.
    #[error("duplicate model type '{0}'")]
    DuplicateType(String),
    /// A vertex accessor named an edge model type, or vice versa.
    #[error("model type '{model}' is not a {expected} type")]
    KindMismatch {
        /// Model type tag as written.
        model: String,
        /// `"vertex"` or `"edge"`.
        expected: &'static str,
    },
}
