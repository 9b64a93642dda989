//! Random generation of well-typed graphs.
//!
//! Each call to [`GraphGenerator::generate_opr`] appends one operator instance to a working
//! graph:
//!
//! 1. operators are visited in a random order, weighted by [`GenConfig::op_weights`],
//! 2. for each input slot, an existing tensor inside the slot's domain is reused with
//!    probability [`GenConfig::reuse_prob`], otherwise a fresh graph input is sampled from it,
//! 3. the remaining attributes are sampled,
//! 4. the whole instance is checked against the operator's specification, including `extra`
//!    invariants,
//! 5. outputs are derived.
//!
//! A failure in steps 2-5 discards the attempt and resamples, up to the operator's retry budget,
//! before moving on to the next operator. Nothing is added to the graph until an attempt
//! succeeds.
use super::{Graph, OprId, TensorId};
use crate::error::{Error, Result};
use crate::expr::{Desc, Domains, Env, Eval, Position};
use crate::spec::{Op, OpRegistry};
use crate::value::{DataType, TensorType, Value};
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Generator settings. Integer ranges are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenConfig {
    /// Ranks of sampled tensors
    pub rank_range: (usize, usize),
    /// Dimension sizes of sampled tensors
    pub dim_range: (usize, usize),
    /// Half-open range of float attributes without declared bounds
    pub float_range: (f64, f64),
    pub dtypes: Vec<DataType>,
    /// Upper bound on the arity of variadic operators
    pub max_in_num: usize,
    /// Graph inputs created before the first operator
    pub init_inputs: usize,
    /// Operators per generated graph
    pub max_opr_num: usize,
    /// Probability of binding an input slot to an existing tensor
    pub reuse_prob: f64,
    /// Resampling attempts after the first failure, per operator choice
    pub retries: usize,
    /// Per-operator overrides of `retries`
    pub op_retries: BTreeMap<String, usize>,
    /// Relative selection weights; operators not listed have weight 1, and weight 0 disables
    pub op_weights: BTreeMap<String, f64>,
}

impl Default for GenConfig {
    fn default() -> Self {
        GenConfig {
            rank_range: (0, 4),
            dim_range: (1, 8),
            float_range: (0.0, 1.0),
            dtypes: vec![DataType::Float32],
            max_in_num: 3,
            init_inputs: 1,
            max_opr_num: 32,
            reuse_prob: 0.8,
            retries: 10,
            op_retries: BTreeMap::new(),
            op_weights: BTreeMap::new(),
        }
    }
}

impl GenConfig {
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let config: GenConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(Error::Malformed(format!("generator config: {msg}")));
        if self.rank_range.0 > self.rank_range.1 || self.dim_range.0 > self.dim_range.1 {
            return bad("empty rank or dimension range");
        }
        let (lo, hi) = self.float_range;
        if !(lo < hi && lo.is_finite() && hi.is_finite()) {
            return bad("float range must be finite and non-empty");
        }
        if self.dtypes.is_empty() {
            return bad("no dtypes");
        }
        if self.max_in_num == 0 {
            return bad("max_in_num must be positive");
        }
        if !(0.0..=1.0).contains(&self.reuse_prob) {
            return bad("reuse_prob must lie in [0, 1]");
        }
        if self.op_weights.values().any(|w| !(*w >= 0.0 && w.is_finite())) {
            return bad("operator weights must be finite and non-negative");
        }
        Ok(())
    }

    /// Default sampling domains, as half-open intervals
    pub fn domains(&self) -> Domains {
        Domains {
            arity: (1, self.max_in_num as i64 + 1),
            rank: (self.rank_range.0 as i64, self.rank_range.1 as i64 + 1),
            dim: (self.dim_range.0 as i64, self.dim_range.1 as i64 + 1),
            float: self.float_range,
            dtypes: self.dtypes.clone(),
            ..Domains::default()
        }
    }

    pub fn retries_for(&self, op: &Op) -> usize {
        self.op_retries
            .get(&op.name.to_string())
            .copied()
            .unwrap_or(self.retries)
    }

    pub fn weight_for(&self, op: &Op) -> f64 {
        self.op_weights
            .get(&op.name.to_string())
            .copied()
            .unwrap_or(1.0)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Generator

pub struct GraphGenerator<'r, R: RngCore = ChaCha8Rng> {
    registry: &'r OpRegistry,
    config: GenConfig,
    domains: Domains,
    rng: R,
}

impl<'r> GraphGenerator<'r, ChaCha8Rng> {
    /// A generator whose choices are fully determined by `seed`
    pub fn seeded(registry: &'r OpRegistry, config: GenConfig, seed: u64) -> Result<Self> {
        Self::new(registry, config, ChaCha8Rng::seed_from_u64(seed))
    }
}

/// How an input slot of a candidate instance is bound
#[derive(Debug)]
enum Input {
    Existing(TensorId),
    Fresh(TensorType),
}

/// A fully sampled and checked operator instance, not yet added to the graph
#[derive(Debug)]
struct Candidate {
    inputs: Vec<Input>,
    attrs: Vec<(String, Value)>,
    outputs: Vec<TensorType>,
}

impl<'r, R: RngCore> GraphGenerator<'r, R> {
    /// Fails with [`Error::Malformed`] if `config` does not validate
    pub fn new(registry: &'r OpRegistry, config: GenConfig, rng: R) -> Result<Self> {
        config.validate()?;
        let domains = config.domains();
        Ok(GraphGenerator {
            registry,
            config,
            domains,
            rng,
        })
    }

    pub fn config(&self) -> &GenConfig {
        &self.config
    }

    pub fn registry(&self) -> &'r OpRegistry {
        self.registry
    }

    /// Generate a graph of [`GenConfig::max_opr_num`] operators
    pub fn generate(&mut self) -> Result<Graph> {
        let mut graph = Graph::new();
        for _ in 0..self.config.init_inputs {
            let ty = self.sample_input()?;
            graph.add_input(ty);
        }
        while graph.oprs().len() < self.config.max_opr_num {
            self.generate_opr(&mut graph)?;
        }
        log::info!(
            "generated graph with {} operators and {} inputs",
            graph.oprs().len(),
            graph.inputs().len()
        );
        Ok(graph)
    }

    /// Append one operator instance to `graph`.
    ///
    /// Fails with [`Error::GenerationExhausted`] when no operator could be instantiated within
    /// its retry budget. On any failure `graph` is left unchanged.
    pub fn generate_opr(&mut self, graph: &mut Graph) -> Result<OprId> {
        let order = self.op_order();
        let mut attempts = 0;
        let mut last = None;
        for op in &order {
            let tries = 1 + self.config.retries_for(op);
            for k in 0..tries {
                attempts += 1;
                match self.try_op(graph, op) {
                    Ok(candidate) => {
                        let id = commit(graph, op.clone(), candidate)?;
                        if let Some(line) = graph.display_opr(id) {
                            log::debug!("{line}");
                        }
                        return Ok(id);
                    }
                    Err(e) if e.is_recoverable() => {
                        log::trace!("{} attempt {k} failed: {e}", op.name);
                        last = Some(e);
                    }
                    Err(e) => return Err(e.in_op(&op.name)),
                }
            }
            log::debug!("abandoned {} after {tries} attempts", op.name);
        }
        Err(Error::GenerationExhausted {
            ops: order.len(),
            attempts,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// A random permutation of enabled operators, weighted without replacement: each operator
    /// gets the key `u^(1/w)` for uniform `u`, and keys are visited in decreasing order.
    fn op_order(&mut self) -> Vec<Arc<Op>> {
        let mut keyed: Vec<(f64, Arc<Op>)> = vec![];
        for op in self.registry.ops() {
            let w = self.config.weight_for(op);
            if w > 0.0 {
                let u: f64 = self.rng.random();
                keyed.push((u.powf(1.0 / w), op.clone()));
            }
        }
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
        keyed.into_iter().map(|(_, op)| op).collect()
    }

    fn sample_input(&mut self) -> Result<TensorType> {
        let (lo, hi) = self.config.rank_range;
        let rank = self.rng.random_range(lo..=hi);
        let (lo, hi) = self.config.dim_range;
        let shape = (0..rank)
            .map(|_| self.rng.random_range(lo..=hi))
            .collect::<Vec<_>>();
        let dtype = *self
            .config
            .dtypes
            .choose(&mut self.rng)
            .ok_or_else(|| Error::EmptyDomain("no dtypes enabled".into()))?;
        Ok(TensorType::new(dtype, shape))
    }

    /// One sampling attempt for `op`
    fn try_op(&mut self, graph: &Graph, op: &Op) -> Result<Candidate> {
        let spec = &op.spec;
        let reuse_prob = self.config.reuse_prob;
        let mut env = Env::new();
        let mut inputs = vec![];
        {
            let mut ev = Eval::sampling(&mut env, &spec.attrs, &mut self.rng, &self.domains);

            ev.set_position(Position::Arity);
            let n = ev.eval_len(&spec.in_num)?;
            if n == 0 {
                return Err(Error::violation("no inputs"));
            }
            ev.env_mut().in_num = Some(n);
            ev.env_mut().inputs = vec![Desc::default(); n];

            for i in 0..n {
                let reused = if ev.rng()?.random_bool(reuse_prob) {
                    reuse(&mut ev, op, graph, i)?
                } else {
                    None
                };
                inputs.push(match reused {
                    Some(id) => Input::Existing(id),
                    None => Input::Fresh(synthesize(&mut ev, op, i)?),
                });
            }

            ev.set_position(Position::Attr);
            ev.sample_attrs()?;
        }

        let outputs = {
            let mut ev = Eval::strict(&mut env, &spec.attrs);
            spec.check_inputs(&mut ev)?;
            spec.derive_outputs(&mut ev)?
        };
        Ok(Candidate {
            inputs,
            attrs: env.attrs,
            outputs,
        })
    }
}

/// Bind slot `i` to a random existing tensor inside its domain, if there is one.
/// Attributes sampled while testing a rejected tensor are discarded.
fn reuse(ev: &mut Eval, op: &Op, graph: &Graph, i: usize) -> Result<Option<TensorId>> {
    let mut candidates: Vec<TensorId> = (0..graph.tensors().len()).map(TensorId).collect();
    candidates.shuffle(ev.rng()?);
    let bound = ev.env().attrs.len();
    for id in candidates {
        let ty = &graph.tensor(id).ty;
        ev.env_mut().inputs[i] = Desc::from(ty);
        match op.spec.slot_matches(ev, i, ty) {
            Ok(true) => return Ok(Some(id)),
            Ok(false) => {}
            Err(e) if e.is_recoverable() => {}
            Err(e) => return Err(e),
        }
        ev.env_mut().attrs.truncate(bound);
    }
    ev.env_mut().inputs[i] = Desc::default();
    Ok(None)
}

/// Sample a fresh tensor type for slot `i`: rank, then dtype, then shape
fn synthesize(ev: &mut Eval, op: &Op, i: usize) -> Result<TensorType> {
    let spec = &op.spec;
    ev.set_position(Position::Rank);
    let rank = ev.element(&spec.in_ranks, i, |ev, e| ev.eval_len(e))?;
    ev.env_mut().inputs[i].rank = Some(rank);
    let dtype = ev.element(&spec.in_dtypes, i, |ev, e| ev.eval_dtype(e))?;
    ev.env_mut().inputs[i].dtype = Some(dtype);
    ev.set_position(Position::Dim);
    let shape = ev.element(&spec.in_shapes, i, |ev, e| ev.eval_shape(e))?;
    if shape.len() != rank {
        return Err(Error::violation(format!(
            "IN[{i}] has rank {rank} but shape {shape:?}"
        )));
    }
    let ty = TensorType::new(dtype, shape);
    log::trace!("{} IN[{i}] = {ty}", op.name);
    ev.env_mut().inputs[i] = Desc::from(&ty);
    Ok(ty)
}

fn commit(graph: &mut Graph, op: Arc<Op>, candidate: Candidate) -> Result<OprId> {
    let inputs = candidate
        .inputs
        .into_iter()
        .map(|input| match input {
            Input::Existing(id) => id,
            Input::Fresh(ty) => graph.add_input(ty),
        })
        .collect();
    graph.add_opr(op, candidate.attrs, inputs, candidate.outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json() {
        let config: GenConfig =
            serde_json::from_str(r#"{"max_opr_num": 5, "dtypes": ["float64", "int32"]}"#)
                .unwrap();
        assert_eq!(config.max_opr_num, 5);
        assert_eq!(config.dtypes, vec![DataType::Float64, DataType::Int32]);
        assert_eq!(config.retries, GenConfig::default().retries);
        config.validate().unwrap();

        let text = serde_json::to_string(&config).unwrap();
        let back: GenConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_config_validate() {
        let config = GenConfig {
            dtypes: vec![],
            ..GenConfig::default()
        };
        assert!(config.validate().is_err());
        let config = GenConfig {
            reuse_prob: 1.5,
            ..GenConfig::default()
        };
        assert!(config.validate().is_err());
        let config = GenConfig {
            float_range: (0.0, f64::INFINITY),
            ..GenConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let registry = crate::ops::builtin().unwrap();
        for config in [
            GenConfig {
                reuse_prob: 1.5,
                ..GenConfig::default()
            },
            GenConfig {
                float_range: (1.0, 0.0),
                ..GenConfig::default()
            },
        ] {
            let err = GraphGenerator::seeded(&registry, config, 0).err().unwrap();
            assert!(matches!(err, Error::Malformed(_)), "{err}");
        }
    }

    #[test]
    fn test_domains_are_half_open() {
        let domains = GenConfig::default().domains();
        assert_eq!(domains.rank, (0, 5));
        assert_eq!(domains.dim, (1, 9));
        assert_eq!(domains.arity, (1, 4));
    }
}
