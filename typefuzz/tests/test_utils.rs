use typefuzz::graph::{GenConfig, Graph, GraphGenerator};
use typefuzz::ops::builtin;
use typefuzz::spec::OpRegistry;
use typefuzz::value::{DataType, TensorType};

pub fn f32(shape: &[usize]) -> TensorType {
    TensorType::new(DataType::Float32, shape)
}

/// The built-in registry restricted to `names`, or all of it when `names` is empty
pub fn registry(names: &[&str]) -> OpRegistry {
    let all = builtin().expect("built-in operators register");
    if names.is_empty() {
        all
    } else {
        all.subset(names).expect("known operator names")
    }
}

pub fn generate(registry: &OpRegistry, config: GenConfig, seed: u64) -> Graph {
    GraphGenerator::seeded(registry, config, seed)
        .expect("valid config")
        .generate()
        .expect("generation succeeds")
}

pub fn config(max_opr_num: usize) -> GenConfig {
    GenConfig {
        max_opr_num,
        ..GenConfig::default()
    }
}
