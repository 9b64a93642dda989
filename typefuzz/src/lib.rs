#![doc = include_str!("../../README.md")]
pub mod error;

// Constraint language: value types, concrete values and symbolic expressions
pub mod expr;
pub mod ty;
pub mod value;

// path::Path is a type of dot-separated strings used to name operators.
pub mod path;

// Operator specifications and the built-in library
pub mod ops;
pub mod spec;

// Graphs, their generation and checking
pub mod graph;

// Collaborator surfaces: corpus diversity and failing cases
pub mod case;
pub mod metric;

pub use error::{Error, Result};
