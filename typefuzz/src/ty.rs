//! Value types of the constraint language.
//!
//! Equality is purely structural. A [`Type::Tuple`] additionally records whether all of its
//! fields are equal types, computed once on construction.
use crate::error::{Error, Result};
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Str,
    DType,
    /// Fixed-length sequence of possibly heterogeneous fields
    Tuple(TupleType),
    /// Variable-length sequence of one element type
    List(Box<Type>),
}

#[derive(Debug, Clone)]
pub struct TupleType {
    fields: Vec<Type>,
    is_homo: bool,
}

/// Discriminant of a [`Type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Int,
    Float,
    Str,
    DType,
    Tuple,
    List,
}

impl Type {
    pub fn tuple(fields: impl IntoIterator<Item = Type>) -> Self {
        Type::Tuple(TupleType::new(fields.into_iter().collect()))
    }

    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Int => TypeKind::Int,
            Type::Float => TypeKind::Float,
            Type::Str => TypeKind::Str,
            Type::DType => TypeKind::DType,
            Type::Tuple(_) => TypeKind::Tuple,
            Type::List(_) => TypeKind::List,
        }
    }

    /// Find the type of a concrete value.
    ///
    /// Booleans are typed as integers. Lists must be non-empty and homogeneous.
    pub fn of(value: &Value) -> Result<Type> {
        match value {
            Value::Bool(_) | Value::Int(_) => Ok(Type::Int),
            Value::Float(_) => Ok(Type::Float),
            Value::Str(_) => Ok(Type::Str),
            Value::DType(_) => Ok(Type::DType),
            Value::Tuple(fields) => Ok(Type::tuple(
                fields.iter().map(Type::of).collect::<Result<Vec<_>>>()?,
            )),
            Value::List(elems) => {
                let (first, rest) = elems
                    .split_first()
                    .ok_or_else(|| Error::TypeError("empty list has no element type".into()))?;
                let elem = Type::of(first)?;
                for e in rest {
                    if Type::of(e)? != elem {
                        return Err(Error::TypeError(format!("heterogeneous list {value}")));
                    }
                }
                Ok(Type::list(elem))
            }
        }
    }

    /// Whether a concrete value inhabits this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Int, Value::Int(_) | Value::Bool(_)) => true,
            (Type::Float, Value::Float(_) | Value::Int(_)) => true,
            (Type::Str, Value::Str(_)) => true,
            (Type::DType, Value::DType(_)) => true,
            (Type::Tuple(t), Value::Tuple(v) | Value::List(v)) => {
                t.fields.len() == v.len() && t.fields.iter().zip(v).all(|(t, v)| t.accepts(v))
            }
            (Type::List(t), Value::List(v) | Value::Tuple(v)) => v.iter().all(|v| t.accepts(v)),
            _ => false,
        }
    }
}

impl TupleType {
    fn new(fields: Vec<Type>) -> Self {
        let is_homo = match fields.split_first() {
            None => true,
            Some((first, rest)) => rest.iter().all(|t| t == first),
        };
        TupleType { fields, is_homo }
    }

    pub fn fields(&self) -> &[Type] {
        &self.fields
    }

    pub fn is_homo(&self) -> bool {
        self.is_homo
    }
}

// is_homo is a function of the fields, so only the fields take part in equality and hashing.
impl PartialEq for TupleType {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for TupleType {}

impl Hash for TupleType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::DType => write!(f, "dtype"),
            Type::Tuple(t) => {
                let fields: Vec<String> = t.fields.iter().map(|t| t.to_string()).collect();
                write!(f, "({})", fields.join(", "))
            }
            Type::List(t) => write!(f, "[{t}]"),
        }
    }
}
