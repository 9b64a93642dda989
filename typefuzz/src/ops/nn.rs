//! Operators in the `nn` namespace.
use crate::error::Result;
use crate::expr::*;
use crate::spec::{Attr, ConstraintSpec, Op, OpRegistry};
use crate::ty::Type;

pub fn register(registry: &mut OpRegistry) -> Result<()> {
    registry.register(Op::new("nn.relu", ConstraintSpec::default())?)?;
    registry.register(Op::new("nn.softmax", softmax_spec())?)?;
    registry.register(Op::new("nn.dense", dense_spec())?)?;
    Ok(())
}

pub fn softmax_spec() -> ConstraintSpec {
    ConstraintSpec {
        attrs: vec![Attr::new(
            "axis",
            Var::new().ty(Type::Int).range(range(0, input(0).rank())),
        )],
        in_ranks: tuple([Var::new().range(range_from(1))]),
        ..ConstraintSpec::default()
    }
}

/// `data @ weight^T` with `data: [.., k]` and `weight: [units, k]`
pub fn dense_spec() -> ConstraintSpec {
    let k = || input(0).shape().last();

    ConstraintSpec {
        attrs: vec![],
        in_num: 2.into(),
        in_ranks: tuple([Var::new().range(range_from(1)).into(), Expr::from(2)]),
        in_dtypes: tuple([Var::new().ty(Type::DType).into(), input(0).dtype()]),
        in_shapes: tuple([
            list(input(0).rank(), |_| Var::tmpl()),
            tuple([Var::tmpl().into(), k()]),
        ]),
        extra: vec![
            input(0).dtype().equals(input(1).dtype()),
            input(1).shape().at(1).equals(k()),
        ],
        out_num: 1.into(),
        out_ranks: tuple([input(0).rank()]),
        out_dtypes: tuple([input(0).dtype()]),
        out_shapes: tuple([concat([
            input(0).shape().slice(range_to(input(0).rank() - 1)),
            tuple([input(1).shape().at(0)]),
        ])]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{DataType, TensorType};

    #[test]
    fn test_dense() {
        let data = TensorType::new(DataType::Float32, [2, 5, 8]);
        let weight = TensorType::new(DataType::Float32, [16, 8]);
        let out = dense_spec().infer(&[data.clone(), weight], &[]).unwrap();
        assert_eq!(out, vec![TensorType::new(DataType::Float32, [2, 5, 16])]);

        let bad = TensorType::new(DataType::Float32, [16, 7]);
        assert!(dense_spec().infer(&[data, bad], &[]).is_err());
    }
}
