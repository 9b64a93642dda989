//! Tensor transformations: `concatenate`, `split` and `expand_dims`.
use crate::error::Result;
use crate::expr::*;
use crate::spec::{Attr, ConstraintSpec, Op, OpRegistry};
use crate::ty::Type;

pub fn register(registry: &mut OpRegistry) -> Result<()> {
    registry.register(Op::new("concatenate", concat_spec())?)?;
    registry.register(Op::new("split", split_spec())?)?;
    registry.register(Op::new("expand_dims", expand_dims_spec())?)?;
    Ok(())
}

fn axis() -> Expr {
    attr("axis")
}

/// An integer axis of the first input
fn axis_attr() -> Attr {
    Attr::new(
        "axis",
        Var::new().ty(Type::Int).range(range(0, input(0).rank())),
    )
}

/// Join a variable number of tensors along `axis`. All inputs share rank, dtype, and every
/// dimension except `axis`.
pub fn concat_spec() -> ConstraintSpec {
    let first = |i: &Expr| i.clone().equals(0);

    ConstraintSpec {
        attrs: vec![axis_attr()],
        in_num: Var::new().into(),
        in_ranks: list(in_num(), |i| {
            cond(first(&i), Var::new().range(range_from(1)), input(0).rank())
        }),
        in_dtypes: list(in_num(), |i| {
            cond(first(&i), Var::new().ty(Type::DType), input(0).dtype())
        }),
        in_shapes: list(in_num(), |i| {
            list(input(i.clone()).rank(), |j| {
                cond(
                    or([first(&i), j.clone().equals(axis())]),
                    Var::tmpl(),
                    input(0).shape().at(j),
                )
            })
        }),
        extra: vec![for_all(range(1, in_num()), |i| {
            and([
                input(i.clone()).rank().equals(input(0).rank()),
                input(i.clone()).dtype().equals(input(0).dtype()),
                for_all(range_to(input(0).rank()), |j| {
                    or([
                        j.clone().equals(axis()),
                        input(i).shape().at(j.clone()).equals(input(0).shape().at(j)),
                    ])
                }),
            ])
        })],
        out_num: 1.into(),
        out_ranks: tuple([input(0).rank()]),
        out_dtypes: tuple([input(0).dtype()]),
        out_shapes: tuple([list(input(0).rank(), |j| {
            cond(
                j.clone().equals(axis()),
                reduce_index(range_to(in_num()), ArithOp::Add, 0, |i| {
                    input(i).shape().at(j.clone())
                }),
                input(0).shape().at(j),
            )
        })]),
    }
}

/// Split one tensor along `axis` at strictly increasing indices
pub fn split_spec() -> ConstraintSpec {
    let ind = || attr("indices_or_sections");
    let axis_dim = || input(0).shape().at(axis());

    ConstraintSpec {
        attrs: vec![
            axis_attr(),
            // The i-th of a strictly increasing sequence of positive indices is at least i + 1
            Attr::new(
                "indices_or_sections",
                list(Var::new().range(range(1, axis_dim())), |i| {
                    Var::tmpl().ty(Type::Int).range(range(i + 1, axis_dim()))
                }),
            ),
        ],
        in_num: 1.into(),
        in_ranks: tuple([Var::new().range(range_from(1))]),
        in_dtypes: tuple([Var::new().ty(Type::DType)]),
        in_shapes: tuple([list(input(0).rank(), |_| Var::tmpl())]),
        extra: vec![
            ind().at(0).gt(0),
            for_all(range(1, ind().length()), |i| {
                ind().at(i.clone() - 1).lt(ind().at(i))
            }),
            ind().last().lt(axis_dim()),
        ],
        out_num: ind().length() + 1,
        out_ranks: list(out_num(), |_| input(0).rank()),
        out_dtypes: list(out_num(), |_| input(0).dtype()),
        out_shapes: list(out_num(), |i| {
            list(input(0).rank(), |j| {
                let section = cond(
                    i.clone().equals(0),
                    ind().at(0),
                    cond(
                        i.clone().equals(ind().length()),
                        input(0).shape().at(j.clone()) - ind().last(),
                        ind().at(i.clone()) - ind().at(i - 1),
                    ),
                );
                cond(j.clone().equals(axis()), section, input(0).shape().at(j))
            })
        }),
    }
}

/// Insert a dimension of size 1 at `axis`
pub fn expand_dims_spec() -> ConstraintSpec {
    ConstraintSpec {
        attrs: vec![Attr::new(
            "axis",
            Var::new().ty(Type::Int).range(range(0, input(0).rank() + 1)),
        )],
        out_ranks: tuple([input(0).rank() + 1]),
        out_shapes: tuple([concat([
            input(0).shape().slice(range_to(axis())),
            tuple([1]),
            input(0).shape().slice(range_from(axis())),
        ])]),
        ..ConstraintSpec::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{DataType, TensorType, Value};

    fn f32(shape: &[usize]) -> TensorType {
        TensorType::new(DataType::Float32, shape)
    }

    fn attrs(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_concat_axis() {
        let spec = concat_spec();
        let out = spec
            .infer(&[f32(&[3, 4]), f32(&[3, 5])], &attrs(&[("axis", 1.into())]))
            .unwrap();
        assert_eq!(out, vec![f32(&[3, 9])]);

        let out = spec
            .infer(&[f32(&[1, 2]), f32(&[4, 2]), f32(&[2, 2])], &attrs(&[("axis", 0.into())]))
            .unwrap();
        assert_eq!(out, vec![f32(&[7, 2])]);
    }

    #[test]
    fn test_concat_mismatch() {
        let spec = concat_spec();
        let err = spec
            .infer(&[f32(&[3, 4]), f32(&[2, 5])], &attrs(&[("axis", 0.into())]))
            .unwrap_err();
        assert!(err.is_recoverable(), "{err}");
        let rank = spec.infer(&[f32(&[3, 4]), f32(&[3])], &attrs(&[("axis", 0.into())]));
        assert!(rank.is_err());
    }

    #[test]
    fn test_split() {
        let spec = split_spec();
        let ind = Value::List(vec![2.into(), 5.into()]);
        let out = spec
            .infer(
                &[f32(&[4, 7])],
                &attrs(&[("axis", 1.into()), ("indices_or_sections", ind)]),
            )
            .unwrap();
        assert_eq!(out, vec![f32(&[4, 2]), f32(&[4, 3]), f32(&[4, 2])]);

        let unordered = Value::List(vec![5.into(), 2.into()]);
        assert!(
            spec.infer(
                &[f32(&[4, 7])],
                &attrs(&[("axis", 1.into()), ("indices_or_sections", unordered)]),
            )
            .is_err()
        );
        let empty = Value::List(vec![]);
        assert!(
            spec.infer(
                &[f32(&[4, 7])],
                &attrs(&[("axis", 1.into()), ("indices_or_sections", empty)]),
            )
            .is_err()
        );
    }

    #[test]
    fn test_expand_dims() {
        let spec = expand_dims_spec();
        for (axis, shape) in [(0, [1, 2, 3]), (1, [2, 1, 3]), (2, [2, 3, 1])] {
            let out = spec
                .infer(&[f32(&[2, 3])], &attrs(&[("axis", axis.into())]))
                .unwrap();
            assert_eq!(out, vec![f32(&shape)]);
        }
        assert!(
            spec.infer(&[f32(&[2, 3])], &attrs(&[("axis", 3.into())]))
                .is_err()
        );
    }
}
