//! Elementwise operators.
use crate::error::Result;
use crate::expr::*;
use crate::spec::{ConstraintSpec, Op, OpRegistry};
use crate::ty::Type;
use crate::value::DataType;

const UNARY: [&str; 5] = ["abs", "exp", "negative", "sigmoid", "tanh"];
const BINARY: [&str; 5] = ["add", "subtract", "multiply", "maximum", "minimum"];
const COMPARE: [&str; 3] = ["less", "greater", "equal"];

pub fn register(registry: &mut OpRegistry) -> Result<()> {
    for name in UNARY {
        registry.register(Op::new(name, unary())?)?;
    }
    for name in BINARY {
        registry.register(Op::new(name, bcast())?)?;
    }
    for name in COMPARE {
        registry.register(Op::new(name, bcast_cmp())?)?;
    }
    Ok(())
}

/// One input, one output of the same type
pub fn unary() -> ConstraintSpec {
    ConstraintSpec::default()
}

/// Two inputs broadcast against each other under NumPy rules.
///
/// Shapes are aligned at their trailing dimensions, where each pair of sizes must be equal or
/// contain a 1. Leading dimensions come from the input of greater rank.
pub fn bcast() -> ConstraintSpec {
    let m = || input(0).rank();
    let n = || input(1).rank();
    let lhs = |i: Expr| input(0).shape().at(i);
    let rhs = |i: Expr| input(1).shape().at(i);

    ConstraintSpec {
        attrs: vec![],
        in_num: 2.into(),
        in_ranks: tuple([Var::new(), Var::new()]),
        in_dtypes: tuple([Var::new().ty(Type::DType).into(), input(0).dtype()]),
        in_shapes: tuple([
            list(m(), |_| Var::tmpl()),
            // An aligned dimension is free against a 1, otherwise it copies the first input's
            // or is 1. Leading dimensions are free.
            list(n(), |j| {
                let k = m() - n() + j;
                cond(
                    k.clone().ge(0),
                    cond(
                        lhs(k.clone()).equals(1),
                        Var::tmpl(),
                        cond(Var::tmpl().choices([true, false]), lhs(k), 1),
                    ),
                    Var::tmpl(),
                )
            }),
        ]),
        extra: vec![
            input(0).dtype().equals(input(1).dtype()),
            for_all(range_to(m().min(n())), |i| {
                let l = lhs(m() - 1 - i.clone());
                let r = rhs(n() - 1 - i);
                or([l.clone().equals(r.clone()), l.equals(1), r.equals(1)])
            }),
        ],
        out_num: 1.into(),
        out_ranks: tuple([m().max(n())]),
        out_dtypes: tuple([input(0).dtype()]),
        out_shapes: tuple([cond(
            m().ge(n()),
            concat([
                input(0).shape().slice(range_to(m() - n())),
                list(n(), |i| bdim(lhs(m() - n() + i.clone()), rhs(i))),
            ]),
            concat([
                input(1).shape().slice(range_to(n() - m())),
                list(m(), |i| bdim(lhs(i.clone()), rhs(n() - m() + i))),
            ]),
        )]),
    }
}

/// Result of broadcasting aligned dimensions `l` and `r`, which may be 0
fn bdim(l: Expr, r: Expr) -> Expr {
    cond(l.clone().equals(1), r, l)
}

/// Broadcasting comparison with a boolean output
pub fn bcast_cmp() -> ConstraintSpec {
    ConstraintSpec {
        out_dtypes: tuple([DataType::Bool]),
        ..bcast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TensorType;

    fn f32(shape: &[usize]) -> TensorType {
        TensorType::new(DataType::Float32, shape)
    }

    #[test]
    fn test_bcast_infer() {
        let spec = bcast();
        let out = spec.infer(&[f32(&[2, 1, 4]), f32(&[3, 1])], &[]).unwrap();
        assert_eq!(out, vec![f32(&[2, 3, 4])]);
        let out = spec.infer(&[f32(&[5]), f32(&[2, 3, 5])], &[]).unwrap();
        assert_eq!(out, vec![f32(&[2, 3, 5])]);
        let out = spec.infer(&[f32(&[]), f32(&[7])], &[]).unwrap();
        assert_eq!(out, vec![f32(&[7])]);
    }

    #[test]
    fn test_bcast_zero_dims() {
        let spec = bcast();
        let out = spec.infer(&[f32(&[0]), f32(&[1])], &[]).unwrap();
        assert_eq!(out, vec![f32(&[0])]);
        let out = spec.infer(&[f32(&[1, 3]), f32(&[0, 1])], &[]).unwrap();
        assert_eq!(out, vec![f32(&[0, 3])]);
        let out = spec.infer(&[f32(&[2, 0]), f32(&[0])], &[]).unwrap();
        assert_eq!(out, vec![f32(&[2, 0])]);
        assert!(spec.infer(&[f32(&[0]), f32(&[2])], &[]).is_err());
    }

    #[test]
    fn test_bcast_rejects() {
        let spec = bcast();
        assert!(spec.infer(&[f32(&[2, 3]), f32(&[4, 3])], &[]).is_err());
        let i32 = TensorType::new(DataType::Int32, [3]);
        assert!(spec.infer(&[f32(&[3]), i32], &[]).is_err());
    }

    #[test]
    fn test_cmp_output_is_bool() {
        let out = bcast_cmp()
            .infer(&[f32(&[2, 2]), f32(&[2])], &[])
            .unwrap();
        assert_eq!(out, vec![TensorType::new(DataType::Bool, [2, 2])]);
    }
}
