//! Built-in operator specifications.
//!
//! Each submodule registers a family of operators:
//!
//! - [`ew`]: unary elementwise operators, broadcasting binary operators and comparisons
//! - [`trans`]: `concatenate`, `split` and `expand_dims`
//! - [`reduce`]: reductions along one axis
//! - [`nn`]: operators in the `nn` namespace
use crate::error::Result;
use crate::spec::OpRegistry;

pub mod ew;
pub mod nn;
pub mod reduce;
pub mod trans;

/// A registry holding every built-in operator
pub fn builtin() -> Result<OpRegistry> {
    let mut registry = OpRegistry::new();
    ew::register(&mut registry)?;
    trans::register(&mut registry)?;
    reduce::register(&mut registry)?;
    nn::register(&mut registry)?;
    Ok(registry)
}
