//! Evaluation environments and the evaluator.
//!
//! One [`Eval`] serves three purposes over the same AST:
//!
//! - strict evaluation ([`Eval::strict`]): every node must reduce to a value from the bindings in
//!   the [`Env`]; reaching a [`Var`] is an [`Error::UnresolvedVariable`],
//! - sampling ([`Eval::sampling`]): [`Var`]s draw a value from their declared domain, or from the
//!   positional [`Domains`] default when no bound is declared, and attributes not yet bound are
//!   sampled from their declaration on first reference,
//! - matching ([`Eval::matches`]): test whether a concrete value lies in the domain described by a
//!   pattern expression, without sampling anything the pattern itself mentions.
use super::{ArithOp, CmpOp, Expr, Field, IndexId, Range, Side, Var};
use crate::error::{Error, Result};
use crate::spec::Attr;
use crate::ty::Type;
use crate::value::{DataType, TensorType, Value};
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use std::cmp::Ordering;
use std::mem;

/// A possibly incomplete tensor descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Desc {
    pub rank: Option<usize>,
    pub dtype: Option<DataType>,
    pub shape: Option<Vec<usize>>,
}

impl Desc {
    pub fn rank(&self) -> Option<usize> {
        self.rank.or_else(|| self.shape.as_ref().map(Vec::len))
    }

    /// The concrete descriptor, once dtype and shape are both known
    pub fn tensor_type(&self) -> Option<TensorType> {
        Some(TensorType::new(self.dtype?, self.shape.clone()?))
    }
}

impl From<&TensorType> for Desc {
    fn from(ty: &TensorType) -> Self {
        Desc {
            rank: Some(ty.rank()),
            dtype: Some(ty.dtype),
            shape: Some(ty.shape.clone()),
        }
    }
}

/// Bindings visible to an expression: operator arity and descriptors, and attribute values in
/// the order they were bound.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub in_num: Option<usize>,
    pub inputs: Vec<Desc>,
    pub out_num: Option<usize>,
    pub outputs: Vec<Desc>,
    pub attrs: Vec<(String, Value)>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment with fully known inputs
    pub fn with_inputs(inputs: &[TensorType]) -> Self {
        Env {
            in_num: Some(inputs.len()),
            inputs: inputs.iter().map(Desc::from).collect(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn set_attr(&mut self, name: &str, value: Value) {
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }
}

/// Default sampling domains used when a [`Var`] declares no bound.
/// Integer intervals are half-open.
#[derive(Debug, Clone)]
pub struct Domains {
    pub arity: (i64, i64),
    pub rank: (i64, i64),
    pub dim: (i64, i64),
    pub int: (i64, i64),
    pub float: (f64, f64),
    pub dtypes: Vec<DataType>,
}

impl Default for Domains {
    fn default() -> Self {
        Domains {
            arity: (1, 4),
            rank: (0, 5),
            dim: (1, 9),
            int: (0, 8),
            float: (0.0, 1.0),
            dtypes: vec![DataType::Float32],
        }
    }
}

/// What an integer variable currently stands for, selecting its default domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Arity,
    Rank,
    Dim,
    Attr,
}

struct Sampler<'a> {
    rng: &'a mut dyn RngCore,
    domains: &'a Domains,
}

pub struct Eval<'a> {
    env: &'a mut Env,
    decls: &'a [Attr],
    scope: Vec<(IndexId, i64)>,
    sampler: Option<Sampler<'a>>,
    position: Position,
    // set while evaluating a pattern's derived parts, where variables must not be sampled
    derived_only: bool,
    // attributes whose domain is being evaluated
    pending: Vec<String>,
}

impl<'a> Eval<'a> {
    pub fn strict(env: &'a mut Env, decls: &'a [Attr]) -> Self {
        Eval {
            env,
            decls,
            scope: vec![],
            sampler: None,
            position: Position::Attr,
            derived_only: false,
            pending: vec![],
        }
    }

    pub fn sampling(
        env: &'a mut Env,
        decls: &'a [Attr],
        rng: &'a mut dyn RngCore,
        domains: &'a Domains,
    ) -> Self {
        Eval {
            sampler: Some(Sampler { rng, domains }),
            ..Self::strict(env, decls)
        }
    }

    pub fn env(&self) -> &Env {
        &*self.env
    }

    pub fn env_mut(&mut self) -> &mut Env {
        &mut *self.env
    }

    /// Select the default domain for integer variables sampled from now on
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Evaluation

    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Var(var) => self.sample(var),
            Expr::Index(id) => self.index(*id).map(Value::Int),
            Expr::Attr(name) => self.attr(name),
            Expr::Num(side) => {
                let num = match side {
                    Side::In => self.env.in_num,
                    Side::Out => self.env.out_num,
                };
                num.map(Value::from)
                    .ok_or_else(|| Error::MissingBinding(format!("{side}.num")))
            }
            Expr::Tensor { side, index, field } => self.tensor(*side, index, *field),
            Expr::Arith(op, l, r) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                arith(*op, &l, &r)
            }
            Expr::Cmp(op, l, r) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                compare(*op, &l, &r).map(Value::Bool)
            }
            Expr::Not(e) => Ok(Value::Bool(!self.eval_bool(e)?)),
            Expr::And(es) => {
                for e in es {
                    if !self.eval_bool(e)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(es) => {
                for e in es {
                    if self.eval_bool(e)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Cond(p, a, b) => {
                if self.eval_bool(p)? {
                    self.eval(a)
                } else {
                    self.eval(b)
                }
            }
            Expr::Tuple(es) => es
                .iter()
                .map(|e| self.eval(e))
                .collect::<Result<_>>()
                .map(Value::Tuple),
            Expr::List { len, index, body } => {
                let n = self.eval_len(len)?;
                (0..n as i64)
                    .map(|k| self.scoped(*index, k, |s| s.eval(body)))
                    .collect::<Result<_>>()
                    .map(Value::List)
            }
            Expr::ForAll { range, index, body } => {
                let (begin, end) = self.loop_bounds(range)?;
                for k in begin..end {
                    if !self.scoped(*index, k, |s| s.eval_bool(body))? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Concat(es) => {
                let mut out = vec![];
                for e in es {
                    out.extend(self.eval_seq(e)?);
                }
                Ok(Value::List(out))
            }
            Expr::ReduceIndex {
                range,
                op,
                init,
                index,
                body,
            } => {
                let (begin, end) = self.loop_bounds(range)?;
                let mut acc = self.eval(init)?;
                for k in begin..end {
                    let v = self.scoped(*index, k, |s| s.eval(body))?;
                    acc = arith(*op, &acc, &v)?;
                }
                Ok(acc)
            }
            Expr::GetItem(seq, i) => {
                let seq = self.eval_seq(seq)?;
                let i = self.eval_int(i)?;
                usize::try_from(i)
                    .ok()
                    .and_then(|u| seq.get(u))
                    .cloned()
                    .ok_or(Error::IndexOutOfRange {
                        index: i,
                        len: seq.len(),
                    })
            }
            Expr::Slice(seq, range) => {
                let seq = self.eval_seq(seq)?;
                let len = seq.len();
                let begin = match &range.begin {
                    Some(e) => self.eval_int(e)?,
                    None => 0,
                };
                let end = match &range.end {
                    Some(e) => self.eval_int(e)?,
                    None => len as i64,
                };
                let bound = |i: i64| {
                    usize::try_from(i)
                        .map(|u| u.min(len))
                        .map_err(|_| Error::IndexOutOfRange { index: i, len })
                };
                let (begin, end) = (bound(begin)?, bound(end)?);
                Ok(Value::List(if begin < end {
                    seq[begin..end].to_vec()
                } else {
                    vec![]
                }))
            }
            Expr::Len(seq) => Ok(Value::Int(self.eval_seq(seq)?.len() as i64)),
            Expr::Last(seq) => self
                .eval_seq(seq)?
                .pop()
                .ok_or(Error::IndexOutOfRange { index: -1, len: 0 }),
        }
    }

    pub fn eval_bool(&mut self, expr: &Expr) -> Result<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            v => Err(Error::TypeMismatch(format!(
                "expected bool, found {} {v}",
                v.kind()
            ))),
        }
    }

    pub fn eval_int(&mut self, expr: &Expr) -> Result<i64> {
        let v = self.eval(expr)?;
        v.as_int().ok_or_else(|| {
            Error::TypeMismatch(format!("expected int, found {} {v}", v.kind()))
        })
    }

    pub fn eval_float(&mut self, expr: &Expr) -> Result<f64> {
        let v = self.eval(expr)?;
        v.as_float().ok_or_else(|| {
            Error::TypeMismatch(format!("expected float, found {} {v}", v.kind()))
        })
    }

    /// Evaluate a non-negative integer such as a rank, length or dimension
    pub fn eval_len(&mut self, expr: &Expr) -> Result<usize> {
        let n = self.eval_int(expr)?;
        usize::try_from(n).map_err(|_| Error::violation(format!("negative size {n}")))
    }

    pub fn eval_seq(&mut self, expr: &Expr) -> Result<Vec<Value>> {
        let v = self.eval(expr)?;
        let kind = v.kind();
        v.into_seq()
            .ok_or_else(|| Error::TypeMismatch(format!("expected a sequence, found {kind}")))
    }

    /// Evaluate a shape: a sequence of non-negative integers
    pub fn eval_shape(&mut self, expr: &Expr) -> Result<Vec<usize>> {
        self.eval_seq(expr)?
            .iter()
            .map(|d| match d.as_int() {
                Some(n) => {
                    usize::try_from(n).map_err(|_| Error::violation(format!("negative dim {n}")))
                }
                None => Err(Error::TypeMismatch(format!("dimension {d} is not an int"))),
            })
            .collect()
    }

    pub fn eval_dtype(&mut self, expr: &Expr) -> Result<DataType> {
        let v = self.eval(expr)?;
        v.as_dtype().ok_or_else(|| {
            Error::TypeMismatch(format!("expected dtype, found {} {v}", v.kind()))
        })
    }

    /// Apply `f` to the `i`-th element expression of a per-slot formula.
    ///
    /// Per-slot formulas are written either as a tuple with one expression per slot, or as a
    /// list whose body is evaluated with its index bound to `i`. Conditionals select a branch
    /// first.
    pub fn element<T>(
        &mut self,
        seq: &Expr,
        i: usize,
        f: impl FnOnce(&mut Self, &Expr) -> Result<T>,
    ) -> Result<T> {
        match seq {
            Expr::Tuple(es) => match es.get(i) {
                Some(e) => f(self, e),
                None => Err(Error::Malformed(format!(
                    "no formula for slot {i} in a tuple of {}",
                    es.len()
                ))),
            },
            Expr::List { index, body, .. } => self.scoped(*index, i as i64, |s| f(s, body)),
            Expr::Cond(p, a, b) => {
                if self.eval_bool(p)? {
                    self.element(a, i, f)
                } else {
                    self.element(b, i, f)
                }
            }
            _ => Err(Error::Malformed(
                "per-slot formula must be a tuple or a list".into(),
            )),
        }
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Matching

    /// Whether `value` lies in the domain described by `pattern`.
    ///
    /// Variables are domain tests, lists, tuples and conditionals recurse into their elements,
    /// and any other node is evaluated and compared for equality. A conditional on a free
    /// predicate matches if either branch does.
    pub fn matches(&mut self, pattern: &Expr, value: &Value) -> Result<bool> {
        match pattern {
            Expr::Var(var) => self.in_domain(var, value),
            Expr::Cond(p, a, b) if p.contains_var() => {
                Ok(self.matches(a, value)? || self.matches(b, value)?)
            }
            Expr::Cond(p, a, b) => {
                if self.derived(|s| s.eval_bool(p))? {
                    self.matches(a, value)
                } else {
                    self.matches(b, value)
                }
            }
            Expr::Tuple(es) => {
                let Some(vs) = value.as_seq() else {
                    return Ok(false);
                };
                if vs.len() != es.len() {
                    return Ok(false);
                }
                for (e, v) in es.iter().zip(vs) {
                    if !self.matches(e, v)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::List { len, index, body } => {
                let Some(vs) = value.as_seq() else {
                    return Ok(false);
                };
                if !self.matches(len, &Value::from(vs.len()))? {
                    return Ok(false);
                }
                for (k, v) in vs.iter().enumerate() {
                    if !self.scoped(*index, k as i64, |s| s.matches(body, v))? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(self.derived(|s| s.eval(pattern))? == *value),
        }
    }

    fn in_domain(&mut self, var: &Var, value: &Value) -> Result<bool> {
        match &var.ty {
            Some(ty) if !ty.accepts(value) => return Ok(false),
            None if value.as_seq().is_some() => return Ok(false),
            _ => {}
        }
        if let Some(choices) = &var.choices {
            if !choices.contains(value) {
                return Ok(false);
            }
        }
        if let Some(range) = &var.range {
            let Some(x) = value.as_float() else {
                return Ok(false);
            };
            if let Some(begin) = &range.begin {
                if x < self.derived(|s| s.eval_float(begin))? {
                    return Ok(false);
                }
            }
            if let Some(end) = &range.end {
                if x >= self.derived(|s| s.eval_float(end))? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn derived<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let prev = mem::replace(&mut self.derived_only, true);
        let result = f(self);
        self.derived_only = prev;
        result
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Attributes

    /// Bind every declared attribute that has not been bound yet
    pub fn sample_attrs(&mut self) -> Result<()> {
        let decls = self.decls;
        for decl in decls {
            self.attr(&decl.name)?;
        }
        Ok(())
    }

    fn attr(&mut self, name: &str) -> Result<Value> {
        if let Some(v) = self.env.attr(name) {
            return Ok(v.clone());
        }
        if self.sampler.is_none() {
            return Err(Error::MissingBinding(format!("attribute `{name}`")));
        }
        let decls = self.decls;
        let decl = decls
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::Malformed(format!("undeclared attribute `{name}`")))?;
        if self.pending.iter().any(|p| p == name) {
            return Err(Error::Malformed(format!(
                "domain of attribute `{name}` refers to itself"
            )));
        }

        // Attribute domains are evaluated outside of any enclosing loop or pattern
        self.pending.push(name.to_string());
        let scope = mem::take(&mut self.scope);
        let position = mem::replace(&mut self.position, Position::Attr);
        let derived_only = mem::replace(&mut self.derived_only, false);
        let result = self.eval(&decl.domain);
        self.derived_only = derived_only;
        self.position = position;
        self.scope = scope;
        self.pending.pop();

        let value = result?;
        log::trace!("sampled attribute {name} = {value}");
        self.env.set_attr(name, value.clone());
        Ok(value)
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Sampling

    fn sample(&mut self, var: &Var) -> Result<Value> {
        if self.sampler.is_none() || self.derived_only {
            return Err(Error::UnresolvedVariable(var.to_string()));
        }
        if let Some(choices) = &var.choices {
            let rng = self.rng()?;
            return choices
                .choose(rng)
                .cloned()
                .ok_or_else(|| Error::EmptyDomain(format!("{var} has no choices")));
        }
        match &var.ty {
            Some(Type::DType) => {
                let sampler = self.sampler()?;
                sampler
                    .domains
                    .dtypes
                    .choose(&mut *sampler.rng)
                    .map(|d| Value::DType(*d))
                    .ok_or_else(|| Error::EmptyDomain("no dtypes enabled".into()))
            }
            Some(Type::Float) => {
                let default = self.sampler()?.domains.float;
                let (lo, hi) = self.bounds(var, default, |s, e| s.eval_float(e))?;
                if !(lo < hi) {
                    return Err(Error::EmptyDomain(format!("[{lo}, {hi})")));
                }
                Ok(Value::Float(self.rng()?.random_range(lo..hi)))
            }
            None | Some(Type::Int) => {
                let domains = self.sampler()?.domains;
                let default = match self.position {
                    Position::Arity => domains.arity,
                    Position::Rank => domains.rank,
                    Position::Dim => domains.dim,
                    Position::Attr => domains.int,
                };
                let (lo, hi) = self.bounds(var, default, |s, e| s.eval_int(e))?;
                if lo >= hi {
                    return Err(Error::EmptyDomain(format!("[{lo}, {hi})")));
                }
                Ok(Value::Int(self.rng()?.random_range(lo..hi)))
            }
            Some(ty) => Err(Error::Malformed(format!(
                "cannot sample a {ty} variable without choices"
            ))),
        }
    }

    fn bounds<T>(
        &mut self,
        var: &Var,
        default: (T, T),
        mut eval: impl FnMut(&mut Self, &Expr) -> Result<T>,
    ) -> Result<(T, T)> {
        let Some(range) = &var.range else {
            return Ok(default);
        };
        let lo = match &range.begin {
            Some(e) => eval(self, e)?,
            None => default.0,
        };
        let hi = match &range.end {
            Some(e) => eval(self, e)?,
            None => default.1,
        };
        Ok((lo, hi))
    }

    fn sampler(&mut self) -> Result<&mut Sampler<'a>> {
        self.sampler
            .as_mut()
            .ok_or_else(|| Error::Malformed("sampling requires a random source".into()))
    }

    /// The random source of a sampling evaluator
    pub fn rng(&mut self) -> Result<&mut dyn RngCore> {
        Ok(&mut *self.sampler()?.rng)
    }

    ////////////////////////////////////////////////////////////////////////////////
    // Bindings

    fn scoped<T>(
        &mut self,
        index: IndexId,
        value: i64,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.scope.push((index, value));
        let result = f(self);
        self.scope.pop();
        result
    }

    fn index(&self, id: IndexId) -> Result<i64> {
        self.scope
            .iter()
            .rev()
            .find(|(i, _)| *i == id)
            .map(|(_, v)| *v)
            .ok_or_else(|| Error::MissingBinding(format!("loop index {id:?}")))
    }

    fn tensor(&mut self, side: Side, index: &Expr, field: Field) -> Result<Value> {
        let i = self.eval_len(index)?;
        let descs = match side {
            Side::In => &self.env.inputs,
            Side::Out => &self.env.outputs,
        };
        let missing = || Error::MissingBinding(format!("{side}[{i}].{field}"));
        let desc = descs.get(i).ok_or_else(missing)?;
        let value = match field {
            Field::Rank => desc.rank().map(Value::from),
            Field::DType => desc.dtype.map(Value::DType),
            Field::Shape => desc.shape.as_deref().map(Value::shape),
        };
        value.ok_or_else(missing)
    }

    fn loop_bounds(&mut self, range: &Range) -> Result<(i64, i64)> {
        let begin = match &range.begin {
            Some(e) => self.eval_int(e)?,
            None => 0,
        };
        let end = match &range.end {
            Some(e) => self.eval_int(e)?,
            None => return Err(Error::Malformed("loop over an unbounded range".into())),
        };
        Ok((begin, end))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Value-level operators

fn arith(op: ArithOp, l: &Value, r: &Value) -> Result<Value> {
    if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
        let v = match op {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Max => Some(a.max(b)),
            ArithOp::Min => Some(a.min(b)),
        };
        return v
            .map(Value::Int)
            .ok_or_else(|| Error::violation(format!("integer overflow in {l} {op} {r}")));
    }
    match (l.as_float(), r.as_float()) {
        (Some(a), Some(b)) => Ok(Value::Float(match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Max => a.max(b),
            ArithOp::Min => a.min(b),
        })),
        _ => Err(Error::TypeMismatch(format!(
            "{} {op} {}",
            l.kind(),
            r.kind()
        ))),
    }
}

fn order(l: &Value, r: &Value) -> Result<Ordering> {
    if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
        return Ok(a.cmp(&b));
    }
    match (l.as_float(), r.as_float()) {
        (Some(a), Some(b)) => a
            .partial_cmp(&b)
            .ok_or_else(|| Error::TypeMismatch(format!("cannot order {a} and {b}"))),
        _ => Err(Error::TypeMismatch(format!(
            "cannot order {} and {}",
            l.kind(),
            r.kind()
        ))),
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq => l == r,
        CmpOp::Ne => l != r,
        CmpOp::Lt => order(l, r)?.is_lt(),
        CmpOp::Le => order(l, r)?.is_le(),
        CmpOp::Gt => order(l, r)?.is_gt(),
        CmpOp::Ge => order(l, r)?.is_ge(),
    })
}
