//! # Constraint expressions
//!
//! A small symbolic language used by operator specifications to relate the ranks, dtypes and
//! shapes of an operator's inputs to its attributes and outputs.
//!
//! Every node either evaluates deterministically in an [`Env`], or is a free [`Var`] which the
//! generator samples within its declared domain. Loop-like nodes ([`list`], [`for_all`],
//! [`reduce_index`]) take a closure from an index expression to a body, and the closure is
//! called once at construction time with a fresh [`Expr::Index`].
//!
//! ```
//! use typefuzz::expr::*;
//!
//! // A shape with the same rank as the first input, whose dimensions are sampled freely
//! let shape = list(input(0).rank(), |_| Var::tmpl());
//! ```
use crate::ty::Type;
use crate::value::{DataType, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

mod eval;
pub use eval::{Desc, Domains, Env, Eval, Position};

/// Identifies the loop index bound by a [`list`], [`for_all`] or [`reduce_index`] node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexId(usize);

impl IndexId {
    fn fresh() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        IndexId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which descriptor array a [`Expr::Tensor`] or [`Expr::Num`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Rank,
    DType,
    Shape,
}

/// Associative arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A free variable.
///
/// Template variables (`tmpl = true`) are sampled independently by the generator each time they
/// are reached. Other variables are bound from the graph when they describe an operator input,
/// and must never appear where a value has to be derived (extra invariants and outputs).
#[derive(Debug, Clone, Default)]
pub struct Var {
    pub ty: Option<Type>,
    pub range: Option<Range>,
    pub choices: Option<Vec<Value>>,
    pub tmpl: bool,
}

/// Half-open interval `[begin, end)` whose bounds are themselves expressions.
#[derive(Debug, Clone, Default)]
pub struct Range {
    pub begin: Option<Box<Expr>>,
    pub end: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Const(Value),
    Var(Var),
    /// A loop index bound by an enclosing node
    Index(IndexId),
    /// Current value of a named attribute
    Attr(String),
    /// Number of inputs or outputs
    Num(Side),
    /// A field of the i-th input or output descriptor
    Tensor {
        side: Side,
        index: Box<Expr>,
        field: Field,
    },
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Fixed-length sequence of independent expressions
    Tuple(Vec<Expr>),
    /// `[body(0), ..., body(len - 1)]`
    List {
        len: Box<Expr>,
        index: IndexId,
        body: Box<Expr>,
    },
    /// True iff `body(i)` holds for every `i` in the range
    ForAll {
        range: Range,
        index: IndexId,
        body: Box<Expr>,
    },
    Concat(Vec<Expr>),
    /// Left fold of `op` over `body(i)` for `i` in the range, starting from `init`
    ReduceIndex {
        range: Range,
        op: ArithOp,
        init: Box<Expr>,
        index: IndexId,
        body: Box<Expr>,
    },
    GetItem(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, Range),
    Len(Box<Expr>),
    /// Last element of a non-empty sequence
    Last(Box<Expr>),
}

////////////////////////////////////////////////////////////////////////////////
// Variables

impl Var {
    /// A variable bound from context rather than sampled independently
    pub fn new() -> Self {
        Self::default()
    }

    /// A template variable, sampled independently every time it is reached
    pub fn tmpl() -> Self {
        Var {
            tmpl: true,
            ..Self::default()
        }
    }

    pub fn ty(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    pub fn choices<T: Into<Value>>(mut self, choices: impl IntoIterator<Item = T>) -> Self {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// A dtype variable over the given dtypes
    pub fn dtype(choices: impl IntoIterator<Item = DataType>) -> Self {
        Var::new().ty(Type::DType).choices(choices)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.tmpl { "Var(tmpl" } else { "Var(" })?;
        let mut sep = if self.tmpl { ", " } else { "" };
        if let Some(ty) = &self.ty {
            write!(f, "{sep}ty={ty}")?;
            sep = ", ";
        }
        if self.range.is_some() {
            write!(f, "{sep}ranged")?;
        }
        write!(f, ")")
    }
}

////////////////////////////////////////////////////////////////////////////////
// Builders

/// Descriptor reference `IN[i]` or `OUT[i]`
#[derive(Debug, Clone)]
pub struct TensorRef {
    side: Side,
    index: Expr,
}

impl TensorRef {
    fn field(&self, field: Field) -> Expr {
        Expr::Tensor {
            side: self.side,
            index: Box::new(self.index.clone()),
            field,
        }
    }

    pub fn rank(&self) -> Expr {
        self.field(Field::Rank)
    }

    pub fn dtype(&self) -> Expr {
        self.field(Field::DType)
    }

    pub fn shape(&self) -> Expr {
        self.field(Field::Shape)
    }
}

/// `IN[i]`
pub fn input(i: impl Into<Expr>) -> TensorRef {
    TensorRef {
        side: Side::In,
        index: i.into(),
    }
}

/// `OUT[i]`
pub fn output(i: impl Into<Expr>) -> TensorRef {
    TensorRef {
        side: Side::Out,
        index: i.into(),
    }
}

/// `IN.num`
pub fn in_num() -> Expr {
    Expr::Num(Side::In)
}

/// `OUT.num`
pub fn out_num() -> Expr {
    Expr::Num(Side::Out)
}

pub fn attr(name: &str) -> Expr {
    Expr::Attr(name.to_string())
}

pub fn cond(pred: impl Into<Expr>, then: impl Into<Expr>, els: impl Into<Expr>) -> Expr {
    Expr::Cond(
        Box::new(pred.into()),
        Box::new(then.into()),
        Box::new(els.into()),
    )
}

pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::And(exprs.into_iter().collect())
}

pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Or(exprs.into_iter().collect())
}

pub fn tuple<T: Into<Expr>>(exprs: impl IntoIterator<Item = T>) -> Expr {
    Expr::Tuple(exprs.into_iter().map(Into::into).collect())
}

pub fn list<T: Into<Expr>>(len: impl Into<Expr>, body: impl FnOnce(Expr) -> T) -> Expr {
    let index = IndexId::fresh();
    Expr::List {
        len: Box::new(len.into()),
        index,
        body: Box::new(body(Expr::Index(index)).into()),
    }
}

pub fn for_all(range: Range, body: impl FnOnce(Expr) -> Expr) -> Expr {
    let index = IndexId::fresh();
    Expr::ForAll {
        range,
        index,
        body: Box::new(body(Expr::Index(index))),
    }
}

pub fn concat(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Concat(exprs.into_iter().collect())
}

pub fn reduce_index(
    range: Range,
    op: ArithOp,
    init: impl Into<Expr>,
    body: impl FnOnce(Expr) -> Expr,
) -> Expr {
    let index = IndexId::fresh();
    Expr::ReduceIndex {
        range,
        op,
        init: Box::new(init.into()),
        index,
        body: Box::new(body(Expr::Index(index))),
    }
}

/// `[begin, end)`
pub fn range(begin: impl Into<Expr>, end: impl Into<Expr>) -> Range {
    Range {
        begin: Some(Box::new(begin.into())),
        end: Some(Box::new(end.into())),
    }
}

/// `[0, end)`
pub fn range_to(end: impl Into<Expr>) -> Range {
    Range {
        begin: None,
        end: Some(Box::new(end.into())),
    }
}

/// `[begin, ∞)`
pub fn range_from(begin: impl Into<Expr>) -> Range {
    Range {
        begin: Some(Box::new(begin.into())),
        end: None,
    }
}

impl Expr {
    fn cmp(self, op: CmpOp, other: impl Into<Expr>) -> Expr {
        Expr::Cmp(op, Box::new(self), Box::new(other.into()))
    }

    fn arith(self, op: ArithOp, other: impl Into<Expr>) -> Expr {
        Expr::Arith(op, Box::new(self), Box::new(other.into()))
    }

    pub fn equals(self, other: impl Into<Expr>) -> Expr {
        self.cmp(CmpOp::Eq, other)
    }

    pub fn not_equals(self, other: impl Into<Expr>) -> Expr {
        self.cmp(CmpOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        self.cmp(CmpOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Expr {
        self.cmp(CmpOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        self.cmp(CmpOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        self.cmp(CmpOp::Ge, other)
    }

    pub fn max(self, other: impl Into<Expr>) -> Expr {
        self.arith(ArithOp::Max, other)
    }

    pub fn min(self, other: impl Into<Expr>) -> Expr {
        self.arith(ArithOp::Min, other)
    }

    /// `self[i]`
    pub fn at(self, i: impl Into<Expr>) -> Expr {
        Expr::GetItem(Box::new(self), Box::new(i.into()))
    }

    /// `self[begin:end]`
    pub fn slice(self, range: Range) -> Expr {
        Expr::Slice(Box::new(self), range)
    }

    pub fn length(self) -> Expr {
        Expr::Len(Box::new(self))
    }

    pub fn last(self) -> Expr {
        Expr::Last(Box::new(self))
    }

    /// Evaluate with no free variables, against a complete environment
    pub fn eval(&self, env: &Env) -> crate::error::Result<Value> {
        let mut env = env.clone();
        Eval::strict(&mut env, &[]).eval(self)
    }

    /// Call `f` on this node and every node below it, including range bounds
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Const(_) | Expr::Index(_) | Expr::Attr(_) | Expr::Num(_) => {}
            Expr::Var(var) => {
                if let Some(r) = &var.range {
                    r.visit(f)
                }
            }
            Expr::Tensor { index, .. } => index.visit(f),
            Expr::Arith(_, l, r) | Expr::Cmp(_, l, r) | Expr::GetItem(l, r) => {
                l.visit(f);
                r.visit(f);
            }
            Expr::Not(e) | Expr::Len(e) | Expr::Last(e) => e.visit(f),
            Expr::And(es) | Expr::Or(es) | Expr::Tuple(es) | Expr::Concat(es) => {
                es.iter().for_each(|e| e.visit(f))
            }
            Expr::Cond(p, a, b) => {
                p.visit(f);
                a.visit(f);
                b.visit(f);
            }
            Expr::List { len, body, .. } => {
                len.visit(f);
                body.visit(f);
            }
            Expr::ForAll { range, body, .. } => {
                range.visit(f);
                body.visit(f);
            }
            Expr::ReduceIndex {
                range, init, body, ..
            } => {
                range.visit(f);
                init.visit(f);
                body.visit(f);
            }
            Expr::Slice(e, range) => {
                e.visit(f);
                range.visit(f);
            }
        }
    }

    pub fn contains_var(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Var(_)));
        found
    }
}

impl Range {
    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        if let Some(b) = &self.begin {
            b.visit(f)
        }
        if let Some(e) = &self.end {
            e.visit(f)
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Operator overloads and conversions

impl<T: Into<Expr>> std::ops::Add<T> for Expr {
    type Output = Expr;

    fn add(self, rhs: T) -> Expr {
        self.arith(ArithOp::Add, rhs)
    }
}

impl<T: Into<Expr>> std::ops::Sub<T> for Expr {
    type Output = Expr;

    fn sub(self, rhs: T) -> Expr {
        self.arith(ArithOp::Sub, rhs)
    }
}

impl<T: Into<Expr>> std::ops::Mul<T> for Expr {
    type Output = Expr;

    fn mul(self, rhs: T) -> Expr {
        self.arith(ArithOp::Mul, rhs)
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl From<Var> for Expr {
    fn from(var: Var) -> Self {
        Expr::Var(var)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Const(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Const(Value::Int(value))
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::Const(Value::Int(value as i64))
    }
}

impl From<usize> for Expr {
    fn from(value: usize) -> Self {
        Expr::Const(Value::Int(value as i64))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(Value::Float(value))
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Const(Value::Bool(value))
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::Const(Value::Str(value.to_string()))
    }
}

impl From<DataType> for Expr {
    fn from(value: DataType) -> Self {
        Expr::Const(Value::DType(value))
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::In => write!(f, "IN"),
            Side::Out => write!(f, "OUT"),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Rank => write!(f, "rank"),
            Field::DType => write!(f, "dtype"),
            Field::Shape => write!(f, "shape"),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Max => "max",
            ArithOp::Min => "min",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests;
