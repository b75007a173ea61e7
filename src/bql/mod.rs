#![forbid(unsafe_code)]

//! BQL compiler: syntax contract, filter IR, join pipeline, and query code
//! generation.
//!
//! Data flows syntax tree → IR → step list → query text. The IR is owned by
//! the pipeline that built it and is immutable after construction; codegen
//! only reads it.

/// Fluent builder producing parser-shaped syntax trees.
pub mod builder;

/// Syntax-tree to IR conversion.
///
/// Resolves type names, normalizes shorthand links, maps operator tokens.
pub mod convert;

/// Front-end rejection errors.
pub mod errors;

/// Filter IR: predicate trees and arena-backed hop chains.
pub mod filter;

/// Step-list parsing for full query expressions.
pub mod pipeline;

/// Predicate rendering into filter fragments.
pub mod render;

/// Query text generation from step lists and IR.
pub mod codegen;

/// Input syntax-tree contract.
pub mod syntax;

pub use builder::BqlBuilder;
pub use codegen::Generator;
pub use errors::ParseError;
