//! Validity of whole graphs.
//!
//! [`check_graph`] is what a reducer runs on a shrunk copy before trusting it: the structure
//! must be consistent and every operator instance must satisfy its own specification.
use super::{Def, Graph, OprId, TensorId};
use crate::error::{Error, Result};

/// Check structure, then every operator against its specification.
///
/// Structure means: every tensor is defined exactly once and its definition agrees with the
/// operator or input list that defines it, every operator reads only tensors defined before
/// it (so the graph is acyclic), and use lists agree with operator inputs.
pub fn check_graph(graph: &Graph) -> Result<()> {
    check_structure(graph)?;
    for opr in graph.oprs() {
        let inputs = graph.input_types(opr);
        let outputs = graph.output_types(opr);
        opr.op
            .spec
            .check(&inputs, &opr.attrs, &outputs)
            .map_err(|e| e.in_op(&opr.op.name))?;
    }
    Ok(())
}

fn check_structure(graph: &Graph) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidGraph(msg));
    let defined = |t: TensorId| t.0 < graph.tensors.len();

    for (k, t) in graph.inputs.iter().enumerate() {
        if !defined(*t) || graph.tensor(*t).def != Def::Input(k) {
            return invalid(format!("input {k} is not defined as v{}", t.0));
        }
    }

    for (i, tensor) in graph.tensors.iter().enumerate() {
        let definer = match tensor.def {
            Def::Input(k) => graph.inputs.get(k),
            Def::Opr(o, k) => graph.oprs.get(o.0).and_then(|opr| opr.outputs.get(k)),
        };
        if definer != Some(&TensorId(i)) {
            return invalid(format!("v{i} is not defined where it claims to be"));
        }
    }

    let mut uses = 0;
    for (o, opr) in graph.oprs.iter().enumerate() {
        let o = OprId(o);
        for (slot, t) in opr.inputs.iter().enumerate() {
            if !defined(*t) {
                return invalid(format!("operator {} reads undefined v{}", o.0, t.0));
            }
            let tensor = graph.tensor(*t);
            match tensor.def {
                Def::Opr(p, _) if p >= o => {
                    return invalid(format!(
                        "operator {} reads v{} before operator {} defines it",
                        o.0, t.0, p.0
                    ));
                }
                _ => {}
            }
            if !tensor.uses.contains(&(o, slot)) {
                return invalid(format!("v{} does not record its use by {}:{slot}", t.0, o.0));
            }
        }
        uses += opr.inputs.len();
        for (k, t) in opr.outputs.iter().enumerate() {
            if !defined(*t) || graph.tensor(*t).def != Def::Opr(o, k) {
                return invalid(format!("output {k} of operator {} is not v{}", o.0, t.0));
            }
        }
    }

    // Each input slot is bound exactly once
    let recorded: usize = graph.tensors.iter().map(|t| t.uses.len()).sum();
    if recorded != uses {
        return invalid(format!("{recorded} recorded uses for {uses} input slots"));
    }
    Ok(())
}
