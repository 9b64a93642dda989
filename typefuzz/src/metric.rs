//! Diversity of a generated corpus.
//!
//! Metrics accumulate over every graph passed to [`Metric::evaluate`] and only read the graph and
//! the registry they were created with.
use crate::graph::{Graph, Opr};
use crate::path::Path;
use crate::spec::OpRegistry;
use std::collections::{BTreeSet, HashMap};

pub trait Metric {
    /// Accumulate the operators and edges of one graph
    fn evaluate(&mut self, graph: &Graph);

    /// Current score, in `[0, 1]`
    fn result(&self) -> f64;
}

/// Registry positions of operators, by name
#[derive(Debug, Clone)]
struct OpIndex {
    names: Vec<Path>,
    index: HashMap<Path, usize>,
}

impl OpIndex {
    fn new(registry: &OpRegistry) -> Self {
        let names: Vec<Path> = registry.ops().iter().map(|op| op.name.clone()).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        OpIndex { names, index }
    }

    fn of(&self, opr: &Opr) -> Option<usize> {
        let found = self.index.get(&opr.op.name).copied();
        if found.is_none() {
            log::warn!("operator {} is not in the measured registry", opr.op.name);
        }
        found
    }
}

////////////////////////////////////////////////////////////////////////////////
// Operators

/// How many instances of each registry operator have been generated
#[derive(Debug, Clone)]
pub struct OpCoverage {
    ops: OpIndex,
    counts: Vec<usize>,
}

impl OpCoverage {
    pub fn new(registry: &OpRegistry) -> Self {
        OpCoverage {
            counts: vec![0; registry.len()],
            ops: OpIndex::new(registry),
        }
    }

    /// Instances per operator, in registry order
    pub fn detail(&self) -> impl Iterator<Item = (&Path, usize)> + '_ {
        self.ops.names.iter().zip(self.counts.iter().copied())
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

impl Metric for OpCoverage {
    fn evaluate(&mut self, graph: &Graph) {
        for opr in graph.oprs() {
            if let Some(i) = self.ops.of(opr) {
                self.counts[i] += 1;
            }
        }
    }

    /// Fraction of registry operators generated at least once
    fn result(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        let seen = self.counts.iter().filter(|c| **c > 0).count();
        seen as f64 / self.counts.len() as f64
    }
}

////////////////////////////////////////////////////////////////////////////////
// Edges

/// Ordered operator pairs `(producer, consumer)` observed on graph edges
#[derive(Debug, Clone)]
pub struct EdgeDiversity {
    ops: OpIndex,
    seen: BTreeSet<(usize, usize)>,
}

impl EdgeDiversity {
    pub fn new(registry: &OpRegistry) -> Self {
        EdgeDiversity {
            ops: OpIndex::new(registry),
            seen: BTreeSet::new(),
        }
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&Path, &Path)> + '_ {
        self.seen
            .iter()
            .map(|(p, c)| (&self.ops.names[*p], &self.ops.names[*c]))
    }
}

impl Metric for EdgeDiversity {
    fn evaluate(&mut self, graph: &Graph) {
        for (p, c) in graph.edges() {
            let producer = self.ops.of(graph.opr(p));
            let consumer = self.ops.of(graph.opr(c));
            if let (Some(p), Some(c)) = (producer, consumer) {
                self.seen.insert((p, c));
            }
        }
    }

    /// Fraction of all `n * n` ordered pairs observed
    fn result(&self) -> f64 {
        let n = self.ops.names.len();
        if n == 0 {
            return 0.0;
        }
        self.seen.len() as f64 / (n * n) as f64
    }
}
