//! Errors raised while typing values, evaluating constraint expressions, and generating graphs.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A concrete value has no corresponding [`Type`](crate::ty::Type)
    #[error("cannot type this value: {0}")]
    TypeError(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("operator already registered: {0}")]
    DuplicateOperator(String),

    /// A variable appeared where only derived values are allowed, or could not be resolved from
    /// the bindings available at the time.
    #[error("unresolved variable in {0}")]
    UnresolvedVariable(String),

    /// A sampled candidate failed an invariant of its operator
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("generation exhausted after trying {ops} operators ({attempts} attempts); last failure: {last}")]
    GenerationExhausted {
        ops: usize,
        attempts: usize,
        last: String,
    },

    /// An expression referred to a descriptor field, attribute or loop index that is not bound
    #[error("unbound {0}")]
    MissingBinding(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// A variable's domain contains no values, e.g. `Range(1, 1)`
    #[error("empty domain: {0}")]
    EmptyDomain(String),

    /// A constraint specification is structurally invalid
    #[error("malformed constraint spec: {0}")]
    Malformed(String),

    #[error("invalid operator name: {0:?}")]
    InvalidPath(String),

    /// Broken graph structure: dangling tensor references, redefinitions or cycles
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("in operator `{op}`: {source}")]
    Operator {
        op: String,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed case directory: {0}")]
    Case(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors local to one generation attempt, which are handled by resampling.
    /// Everything else indicates a malformed specification or a broken environment.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::ConstraintViolation(_)
            | Error::EmptyDomain(_)
            | Error::IndexOutOfRange { .. } => true,
            Error::Operator { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Attach the name of the operator being processed
    pub fn in_op(self, op: impl ToString) -> Self {
        match self {
            e @ Error::Operator { .. } => e,
            e => Error::Operator {
                op: op.to_string(),
                source: Box::new(e),
            },
        }
    }

    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        Error::ConstraintViolation(msg.into())
    }
}
