//! Declarative operator specifications.
//!
//! A [`ConstraintSpec`] relates the arity, ranks, dtypes and shapes of an operator's inputs to
//! its attributes and outputs. Input-side formulas are *patterns*: free [`Var`]s describe the
//! legal domain of a slot, and are either sampled (when the generator synthesizes a fresh input)
//! or tested (when an existing tensor is reused, or a finished instance is checked). Output-side
//! formulas and `extra` invariants are always derived and must not mention variables.
//!
//! Per-slot formulas (`in_ranks`, `out_shapes`, ...) are written either as a [`tuple`] with one
//! expression per slot or as a [`list`] over the slot index.
//!
//! [`Var`]: crate::expr::Var
//! [`tuple`]: crate::expr::tuple
//! [`list`]: crate::expr::list
use crate::error::{Error, Result};
use crate::expr::*;
use crate::path::Path;
use crate::ty::Type;
use crate::value::{TensorType, Value};

pub mod registry;
pub use registry::OpRegistry;

/// A named attribute and the domain of its values
#[derive(Debug, Clone)]
pub struct Attr {
    pub name: String,
    pub domain: Expr,
}

impl Attr {
    pub fn new(name: &str, domain: impl Into<Expr>) -> Self {
        Attr {
            name: name.to_string(),
            domain: domain.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintSpec {
    pub attrs: Vec<Attr>,
    pub in_num: Expr,
    pub in_ranks: Expr,
    pub in_dtypes: Expr,
    pub in_shapes: Expr,
    pub extra: Vec<Expr>,
    pub out_num: Expr,
    pub out_ranks: Expr,
    pub out_dtypes: Expr,
    pub out_shapes: Expr,
}

/// A unary operator whose single output has the type of its single input
impl Default for ConstraintSpec {
    fn default() -> Self {
        ConstraintSpec {
            attrs: vec![],
            in_num: 1.into(),
            in_ranks: list(in_num(), |_| Var::new()),
            in_dtypes: list(in_num(), |_| Var::new().ty(Type::DType)),
            in_shapes: list(in_num(), |i| list(input(i).rank(), |_| Var::new())),
            extra: vec![],
            out_num: 1.into(),
            out_ranks: tuple([input(0).rank()]),
            out_dtypes: tuple([input(0).dtype()]),
            out_shapes: tuple([input(0).shape()]),
        }
    }
}

impl ConstraintSpec {
    /// Reject variables in formulas which must be derived: `extra` invariants and all outputs.
    pub fn validate(&self) -> Result<()> {
        for (k, e) in self.extra.iter().enumerate() {
            if e.contains_var() {
                return Err(Error::UnresolvedVariable(format!("`extra[{k}]`")));
            }
        }
        let outputs = [
            ("out_num", &self.out_num),
            ("out_ranks", &self.out_ranks),
            ("out_dtypes", &self.out_dtypes),
            ("out_shapes", &self.out_shapes),
        ];
        for (field, e) in outputs {
            if e.contains_var() {
                return Err(Error::UnresolvedVariable(format!("`{field}`")));
            }
        }
        Ok(())
    }

    /// Check a complete instance: inputs, attributes and the outputs actually produced
    pub fn check(
        &self,
        inputs: &[TensorType],
        attrs: &[(String, Value)],
        outputs: &[TensorType],
    ) -> Result<()> {
        let expected = self.infer(inputs, attrs)?;
        if expected != outputs {
            return Err(Error::violation(format!(
                "outputs {} differ from derived {}",
                join(outputs),
                join(&expected)
            )));
        }
        Ok(())
    }

    /// Check inputs and attributes, and derive the outputs they determine
    pub fn infer(
        &self,
        inputs: &[TensorType],
        attrs: &[(String, Value)],
    ) -> Result<Vec<TensorType>> {
        let mut env = Env::with_inputs(inputs);
        env.attrs = attrs.to_vec();
        let mut ev = Eval::strict(&mut env, &self.attrs);
        self.check_inputs(&mut ev)?;
        self.derive_outputs(&mut ev)
    }

    /// Test bound attributes, arity and input descriptors against their domains, then every
    /// `extra` invariant.
    pub(crate) fn check_inputs(&self, ev: &mut Eval) -> Result<()> {
        for decl in &self.attrs {
            let value = ev
                .env()
                .attr(&decl.name)
                .cloned()
                .ok_or_else(|| Error::MissingBinding(format!("attribute `{}`", decl.name)))?;
            if !ev.matches(&decl.domain, &value)? {
                return Err(Error::violation(format!(
                    "attribute {} = {value} outside its domain",
                    decl.name
                )));
            }
        }
        if let Some((name, _)) = ev
            .env()
            .attrs
            .iter()
            .find(|(name, _)| !self.attrs.iter().any(|a| &a.name == name))
        {
            return Err(Error::violation(format!("undeclared attribute {name}")));
        }

        let n = ev
            .env()
            .in_num
            .ok_or_else(|| Error::MissingBinding("IN.num".into()))?;
        if ev.env().inputs.len() != n || !ev.matches(&self.in_num, &Value::from(n))? {
            return Err(Error::violation(format!("{n} inputs not allowed")));
        }
        for i in 0..n {
            let ty = ev.env().inputs[i]
                .tensor_type()
                .ok_or_else(|| Error::MissingBinding(format!("descriptor of IN[{i}]")))?;
            if !self.slot_matches(ev, i, &ty)? {
                return Err(Error::violation(format!("IN[{i}] = {ty} outside its domain")));
            }
        }

        for (k, e) in self.extra.iter().enumerate() {
            if !ev.eval_bool(e)? {
                return Err(Error::violation(format!("extra[{k}] does not hold")));
            }
        }
        Ok(())
    }

    /// Whether a tensor of type `ty` lies in the rank, dtype and shape domains of input slot `i`.
    /// The slot must already be bound to `ty` in the environment.
    pub(crate) fn slot_matches(&self, ev: &mut Eval, i: usize, ty: &TensorType) -> Result<bool> {
        Ok(
            ev.element(&self.in_ranks, i, |ev, e| ev.matches(e, &ty.rank().into()))?
                && ev.element(&self.in_dtypes, i, |ev, e| ev.matches(e, &ty.dtype.into()))?
                && ev.element(&self.in_shapes, i, |ev, e| {
                    ev.matches(e, &Value::shape(&ty.shape))
                })?,
        )
    }

    /// Evaluate the output formulas. Each output is bound in the environment as soon as it is
    /// derived, so later outputs may refer to earlier ones.
    pub(crate) fn derive_outputs(&self, ev: &mut Eval) -> Result<Vec<TensorType>> {
        let n = ev.eval_len(&self.out_num)?;
        ev.env_mut().out_num = Some(n);
        ev.env_mut().outputs.clear();
        let mut outputs = Vec::with_capacity(n);
        for i in 0..n {
            let rank = ev.element(&self.out_ranks, i, |ev, e| ev.eval_len(e))?;
            let dtype = ev.element(&self.out_dtypes, i, |ev, e| ev.eval_dtype(e))?;
            let shape = ev.element(&self.out_shapes, i, |ev, e| ev.eval_shape(e))?;
            if shape.len() != rank {
                return Err(Error::Malformed(format!(
                    "OUT[{i}] has rank {rank} but shape {shape:?}"
                )));
            }
            let ty = TensorType::new(dtype, shape);
            ev.env_mut().outputs.push((&ty).into());
            outputs.push(ty);
        }
        Ok(outputs)
    }
}

fn join(types: &[TensorType]) -> String {
    let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    format!("({})", types.join(", "))
}

/// An operator: a unique name and its specification
#[derive(Debug, Clone)]
pub struct Op {
    pub name: Path,
    pub spec: ConstraintSpec,
}

impl Op {
    pub fn new(name: &str, spec: ConstraintSpec) -> Result<Self> {
        Ok(Op {
            name: name.parse()?,
            spec,
        })
    }
}
