//! Print graphs as SSA text, one assignment per operator:
//!
//! ```text
//! v0: float32[3, 4]
//! v1: float32[3, 5]
//! 0:	v2 = concatenate(v0, v1) {axis=1} : float32[3, 9]
//! ```
use super::{Graph, Opr, OprId, TensorId};
use std::fmt::{self, Display};

fn names(ids: &[TensorId]) -> String {
    ids.iter()
        .map(|t| format!("v{}", t.0))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single operator, with the types of its outputs taken from its graph
pub struct OprDisplay<'a> {
    graph: &'a Graph,
    index: usize,
    opr: &'a Opr,
}

impl Graph {
    /// `None` if `id` is not an operator of this graph
    pub fn display_opr(&self, id: OprId) -> Option<OprDisplay<'_>> {
        let opr = self.oprs.get(id.0)?;
        Some(OprDisplay {
            graph: self,
            index: id.0,
            opr,
        })
    }
}

impl Display for OprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opr = self.opr;
        write!(
            f,
            "{}:\t{} = {}({})",
            self.index,
            names(&opr.outputs),
            opr.op.name,
            names(&opr.inputs)
        )?;
        if !opr.attrs.is_empty() {
            let attrs: Vec<String> = opr.attrs.iter().map(|(n, v)| format!("{n}={v}")).collect();
            write!(f, " {{{}}}", attrs.join(", "))?;
        }
        let types: Vec<String> = self
            .graph
            .output_types(opr)
            .iter()
            .map(|t| t.to_string())
            .collect();
        write!(f, " : {}", types.join(", "))
    }
}

impl Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.inputs {
            writeln!(f, "v{}: {}", t.0, self.tensor(*t).ty)?;
        }
        for (index, opr) in self.oprs.iter().enumerate() {
            let line = OprDisplay {
                graph: self,
                index,
                opr,
            };
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
