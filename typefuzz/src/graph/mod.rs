//! Typed computation graphs.
//!
//! A [`Graph`] is a list of tensors and a list of operator instances ([`Opr`]). Every tensor is
//! defined exactly once, either as a graph input or as an output of an operator, and operators
//! only read tensors that exist when they are added. Appending in this order keeps the graph
//! acyclic and its operators topologically sorted.
use crate::error::{Error, Result};
use crate::spec::Op;
use crate::value::{TensorType, Value};
use std::sync::Arc;

pub mod check;
pub mod display;
pub mod generator;

pub use check::check_graph;
pub use generator::{GenConfig, GraphGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OprId(pub usize);

/// Where a tensor comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Def {
    /// The k-th graph input
    Input(usize),
    /// The k-th output of an operator
    Opr(OprId, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub ty: TensorType,
    pub def: Def,
    /// Input slots reading this tensor, as `(operator, slot)`
    pub uses: Vec<(OprId, usize)>,
}

/// One operator instance
#[derive(Debug, Clone)]
pub struct Opr {
    pub op: Arc<Op>,
    pub attrs: Vec<(String, Value)>,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
}

// Specifications have no equality of their own, so operators compare by name
impl PartialEq for Opr {
    fn eq(&self, other: &Self) -> bool {
        self.op.name == other.op.name
            && self.attrs == other.attrs
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    tensors: Vec<Tensor>,
    oprs: Vec<Opr>,
    inputs: Vec<TensorId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, ty: TensorType) -> TensorId {
        let id = TensorId(self.tensors.len());
        self.tensors.push(Tensor {
            ty,
            def: Def::Input(self.inputs.len()),
            uses: vec![],
        });
        self.inputs.push(id);
        id
    }

    /// Append an operator reading existing tensors, creating one tensor per output type
    pub fn add_opr(
        &mut self,
        op: Arc<Op>,
        attrs: Vec<(String, Value)>,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorType>,
    ) -> Result<OprId> {
        if let Some(t) = inputs.iter().find(|t| t.0 >= self.tensors.len()) {
            return Err(Error::InvalidGraph(format!(
                "{} reads undefined tensor v{}",
                op.name, t.0
            )));
        }
        let id = OprId(self.oprs.len());
        for (slot, t) in inputs.iter().enumerate() {
            self.tensors[t.0].uses.push((id, slot));
        }
        let outputs = outputs
            .into_iter()
            .enumerate()
            .map(|(k, ty)| {
                self.tensors.push(Tensor {
                    ty,
                    def: Def::Opr(id, k),
                    uses: vec![],
                });
                TensorId(self.tensors.len() - 1)
            })
            .collect();
        self.oprs.push(Opr {
            op,
            attrs,
            inputs,
            outputs,
        });
        Ok(id)
    }

    /// # Panics
    ///
    /// If `id` was not issued by this graph. See [`Graph::get_tensor`].
    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[id.0]
    }

    pub fn get_tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(id.0)
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// # Panics
    ///
    /// If `id` was not issued by this graph. See [`Graph::get_opr`].
    pub fn opr(&self, id: OprId) -> &Opr {
        &self.oprs[id.0]
    }

    pub fn get_opr(&self, id: OprId) -> Option<&Opr> {
        self.oprs.get(id.0)
    }

    pub fn oprs(&self) -> &[Opr] {
        &self.oprs
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    /// Operator outputs which nothing reads
    pub fn outputs(&self) -> Vec<TensorId> {
        self.oprs
            .iter()
            .flat_map(|opr| opr.outputs.iter().copied())
            .filter(|t| self.tensor(*t).uses.is_empty())
            .collect()
    }

    pub fn input_types(&self, opr: &Opr) -> Vec<TensorType> {
        opr.inputs.iter().map(|t| self.tensor(*t).ty.clone()).collect()
    }

    pub fn output_types(&self, opr: &Opr) -> Vec<TensorType> {
        opr.outputs.iter().map(|t| self.tensor(*t).ty.clone()).collect()
    }

    /// `(producer, consumer)` for every operator input read from another operator's output
    pub fn edges(&self) -> impl Iterator<Item = (OprId, OprId)> + '_ {
        self.oprs.iter().enumerate().flat_map(move |(c, opr)| {
            opr.inputs.iter().filter_map(move |t| match self.tensor(*t).def {
                Def::Opr(p, _) => Some((p, OprId(c))),
                Def::Input(_) => None,
            })
        })
    }

    /// A copy keeping only the operators selected by `keep`, in their original order.
    ///
    /// Tensors read by a kept operator but defined by a dropped one, or by a graph input,
    /// become fresh graph inputs of the copy.
    pub fn retain_oprs(&self, mut keep: impl FnMut(OprId, &Opr) -> bool) -> Result<Graph> {
        let mut graph = Graph::new();
        let mut map: Vec<Option<TensorId>> = vec![None; self.tensors.len()];
        for (o, opr) in self.oprs.iter().enumerate() {
            if !keep(OprId(o), opr) {
                continue;
            }
            let inputs = opr
                .inputs
                .iter()
                .map(|t| match map[t.0] {
                    Some(id) => id,
                    None => {
                        let id = graph.add_input(self.tensor(*t).ty.clone());
                        map[t.0] = Some(id);
                        id
                    }
                })
                .collect();
            let outputs = self.output_types(opr);
            let id = graph.add_opr(opr.op.clone(), opr.attrs.clone(), inputs, outputs)?;
            for (t, new) in opr.outputs.iter().zip(&graph.oprs[id.0].outputs) {
                map[t.0] = Some(*new);
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests;
