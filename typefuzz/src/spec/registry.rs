//! Operators by name.
//!
//! A registry is built once (usually by [`crate::ops::builtin`]) and only read afterwards.
//! Operators keep their registration order, which is what the generator iterates over.
use super::Op;
use crate::error::{Error, Result};
use crate::path::Path;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct OpRegistry {
    ops: Vec<Arc<Op>>,
    index: HashMap<Path, usize>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operator, after checking its specification is well-formed.
    /// Names are never overwritten.
    pub fn register(&mut self, op: Op) -> Result<Arc<Op>> {
        if self.index.contains_key(&op.name) {
            return Err(Error::DuplicateOperator(op.name.to_string()));
        }
        op.spec.validate().map_err(|e| e.in_op(&op.name))?;
        let op = Arc::new(op);
        self.index.insert(op.name.clone(), self.ops.len());
        self.ops.push(op.clone());
        Ok(op)
    }

    pub fn get(&self, name: &Path) -> Option<&Arc<Op>> {
        self.index.get(name).map(|&i| &self.ops[i])
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Op>> {
        name.parse::<Path>()
            .ok()
            .and_then(|path| self.get(&path))
            .cloned()
            .ok_or_else(|| Error::UnknownOperator(name.to_string()))
    }

    pub fn ops(&self) -> &[Arc<Op>] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// A registry with only the named operators, in the order given
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<OpRegistry> {
        let mut registry = OpRegistry::new();
        for name in names {
            let op = self.lookup(name.as_ref())?;
            if registry.index.contains_key(&op.name) {
                return Err(Error::DuplicateOperator(op.name.to_string()));
            }
            registry.index.insert(op.name.clone(), registry.ops.len());
            registry.ops.push(op);
        }
        Ok(registry)
    }
}
