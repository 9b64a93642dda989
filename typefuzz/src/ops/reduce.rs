//! Reductions along a single axis.
use crate::error::Result;
use crate::expr::*;
use crate::spec::{Attr, ConstraintSpec, Op, OpRegistry};
use crate::ty::Type;

const REDUCE: [&str; 3] = ["sum", "mean", "max"];

pub fn register(registry: &mut OpRegistry) -> Result<()> {
    for name in REDUCE {
        registry.register(Op::new(name, reduce_spec())?)?;
    }
    Ok(())
}

/// Reduce `axis` away, or keep it with size 1 when `keepdims` is set
pub fn reduce_spec() -> ConstraintSpec {
    let rank = || input(0).rank();
    let dim = |j: Expr| input(0).shape().at(j);
    let axis = || attr("axis");
    let keepdims = || attr("keepdims");

    ConstraintSpec {
        attrs: vec![
            Attr::new("axis", Var::new().ty(Type::Int).range(range(0, rank()))),
            Attr::new("keepdims", Var::new().choices([false, true])),
        ],
        in_ranks: tuple([Var::new().range(range_from(1))]),
        out_ranks: tuple([cond(keepdims(), rank(), rank() - 1)]),
        out_shapes: tuple([cond(
            keepdims(),
            list(rank(), |j| cond(j.clone().equals(axis()), 1, dim(j))),
            concat([
                input(0).shape().slice(range_to(axis())),
                input(0).shape().slice(range_from(axis() + 1)),
            ]),
        )]),
        ..ConstraintSpec::default()
    }
}
