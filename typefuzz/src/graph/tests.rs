use super::*;
use crate::ops::builtin;
use crate::spec::OpRegistry;
use crate::value::DataType;
use test_log::test;

fn f32(shape: &[usize]) -> TensorType {
    TensorType::new(DataType::Float32, shape)
}

fn axis(a: i64) -> Vec<(String, Value)> {
    vec![("axis".to_string(), Value::Int(a))]
}

/// `v0, v1 -> concatenate -> add -> abs`, with `add` reading the concatenation twice
fn sample_graph(registry: &OpRegistry) -> Graph {
    let mut g = Graph::new();
    let a = g.add_input(f32(&[3, 4]));
    let b = g.add_input(f32(&[3, 5]));
    let cat = g
        .add_opr(
            registry.lookup("concatenate").unwrap(),
            axis(1),
            vec![a, b],
            vec![f32(&[3, 9])],
        )
        .unwrap();
    let c = g.opr(cat).outputs[0];
    let add = g
        .add_opr(
            registry.lookup("add").unwrap(),
            vec![],
            vec![c, c],
            vec![f32(&[3, 9])],
        )
        .unwrap();
    let d = g.opr(add).outputs[0];
    g.add_opr(
        registry.lookup("abs").unwrap(),
        vec![],
        vec![d],
        vec![f32(&[3, 9])],
    )
    .unwrap();
    g
}

#[test]
fn test_structure() {
    let registry = builtin().unwrap();
    let g = sample_graph(&registry);
    assert_eq!(g.inputs(), &[TensorId(0), TensorId(1)]);
    assert_eq!(g.oprs().len(), 3);
    assert_eq!(g.tensors().len(), 5);
    assert_eq!(g.tensor(TensorId(2)).def, Def::Opr(OprId(0), 0));
    assert_eq!(
        g.tensor(TensorId(2)).uses,
        vec![(OprId(1), 0), (OprId(1), 1)]
    );
    assert_eq!(g.outputs(), vec![TensorId(4)]);
    let edges: Vec<_> = g.edges().collect();
    assert_eq!(
        edges,
        vec![(OprId(0), OprId(1)), (OprId(0), OprId(1)), (OprId(1), OprId(2))]
    );
    check_graph(&g).unwrap();
}

#[test]
fn test_add_opr_rejects_undefined_tensor() {
    let registry = builtin().unwrap();
    let mut g = Graph::new();
    g.add_input(f32(&[2]));
    let err = g
        .add_opr(
            registry.lookup("abs").unwrap(),
            vec![],
            vec![TensorId(3)],
            vec![f32(&[2])],
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidGraph(_)));
    assert!(g.oprs().is_empty());
    assert!(g.tensor(TensorId(0)).uses.is_empty());
}

#[test]
fn test_check_graph_rejects_wrong_types() {
    let registry = builtin().unwrap();
    let mut g = Graph::new();
    let a = g.add_input(f32(&[3, 4]));
    let b = g.add_input(f32(&[2, 5]));
    g.add_opr(
        registry.lookup("concatenate").unwrap(),
        axis(0),
        vec![a, b],
        vec![f32(&[5, 4])],
    )
    .unwrap();
    let err = check_graph(&g).unwrap_err();
    assert!(matches!(err, Error::Operator { ref op, .. } if op == "concatenate"));
    assert!(err.is_recoverable());

    let mut g = Graph::new();
    let a = g.add_input(f32(&[3]));
    g.add_opr(
        registry.lookup("abs").unwrap(),
        vec![],
        vec![a],
        vec![f32(&[4])],
    )
    .unwrap();
    assert!(check_graph(&g).is_err());
}

#[test]
fn test_retain_oprs() {
    let registry = builtin().unwrap();
    let g = sample_graph(&registry);

    // dropping `concatenate` turns its output into a fresh input
    let reduced = g.retain_oprs(|id, _| id != OprId(0)).unwrap();
    assert_eq!(reduced.oprs().len(), 2);
    assert_eq!(reduced.inputs().len(), 1);
    assert_eq!(reduced.tensor(reduced.inputs()[0]).ty, f32(&[3, 9]));
    assert_eq!(reduced.oprs()[0].inputs, vec![TensorId(0), TensorId(0)]);
    check_graph(&reduced).unwrap();

    let only_abs = g
        .retain_oprs(|_, opr| opr.op.name.to_string() == "abs")
        .unwrap();
    assert_eq!(only_abs.oprs().len(), 1);
    check_graph(&only_abs).unwrap();

    let all = g.retain_oprs(|_, _| true).unwrap();
    assert_eq!(all.oprs(), g.oprs());
    check_graph(&all).unwrap();
}

#[test]
fn test_foreign_ids() {
    let registry = builtin().unwrap();
    let g = sample_graph(&registry);
    assert!(g.get_tensor(TensorId(4)).is_some());
    assert!(g.get_tensor(TensorId(5)).is_none());
    assert!(g.get_opr(OprId(3)).is_none());
    assert!(g.display_opr(OprId(3)).is_none());
    assert_eq!(
        g.display_opr(OprId(2)).unwrap().to_string(),
        "2:\tv4 = abs(v3) : float32[3, 9]"
    );
}

#[test]
fn test_display() {
    let registry = builtin().unwrap();
    let g = sample_graph(&registry);
    let text = g.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "v0: float32[3, 4]",
            "v1: float32[3, 5]",
            "0:\tv2 = concatenate(v0, v1) {axis=1} : float32[3, 9]",
            "1:\tv3 = add(v2, v2) : float32[3, 9]",
            "2:\tv4 = abs(v3) : float32[3, 9]",
        ]
    );
}
