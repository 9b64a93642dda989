use super::*;
use crate::error::Error;
use crate::spec::Attr;
use crate::value::TensorType;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use test_log::test;

fn ints(xs: &[i64]) -> Value {
    Value::List(xs.iter().map(|x| Value::Int(*x)).collect())
}

fn env_of(shapes: &[&[usize]]) -> Env {
    let inputs: Vec<TensorType> = shapes
        .iter()
        .map(|s| TensorType::new(DataType::Float32, *s))
        .collect();
    Env::with_inputs(&inputs)
}

#[test]
fn test_arith_and_compare() {
    let env = Env::new();
    assert_eq!((Expr::from(2) + 3).eval(&env).unwrap(), Value::Int(5));
    assert_eq!((Expr::from(2) * 3 - 7).eval(&env).unwrap(), Value::Int(-1));
    assert_eq!(Expr::from(4).max(9).eval(&env).unwrap(), Value::Int(9));
    assert_eq!(
        Expr::from(4).lt(2).eval(&env).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        (!Expr::from(4).lt(2)).eval(&env).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        and([Expr::from(true), Expr::from(1).equals(1)])
            .eval(&env)
            .unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        or([Expr::from(false), Expr::from(1).gt(2)]).eval(&env).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn test_descriptor_fields() {
    let env = env_of(&[&[3, 4], &[5]]);
    assert_eq!(in_num().eval(&env).unwrap(), Value::Int(2));
    assert_eq!(input(0).rank().eval(&env).unwrap(), Value::Int(2));
    assert_eq!(input(1).shape().eval(&env).unwrap(), ints(&[5]));
    assert_eq!(
        input(0).dtype().eval(&env).unwrap(),
        Value::DType(DataType::Float32)
    );
    assert!(matches!(
        input(2).rank().eval(&env),
        Err(Error::MissingBinding(_))
    ));
    assert!(matches!(
        output(0).shape().eval(&env),
        Err(Error::MissingBinding(_))
    ));
}

#[test]
fn test_sequences() {
    let env = env_of(&[&[2, 3, 4]]);
    let shape = || input(0).shape();

    let doubled = list(input(0).rank(), |i| shape().at(i) * 2);
    assert_eq!(doubled.eval(&env).unwrap(), ints(&[4, 6, 8]));

    let joined = concat([shape().slice(range_to(1)), tuple([1]), shape().slice(range_from(1))]);
    assert_eq!(joined.eval(&env).unwrap(), ints(&[2, 1, 3, 4]));

    let product = reduce_index(range_to(input(0).rank()), ArithOp::Mul, 1, |i| shape().at(i));
    assert_eq!(product.eval(&env).unwrap(), Value::Int(24));

    assert_eq!(shape().length().eval(&env).unwrap(), Value::Int(3));
    assert_eq!(shape().last().eval(&env).unwrap(), Value::Int(4));

    // slices clamp to the sequence
    assert_eq!(shape().slice(range(2, 10)).eval(&env).unwrap(), ints(&[4]));
    assert_eq!(shape().slice(range(2, 1)).eval(&env).unwrap(), ints(&[]));
}

#[test]
fn test_for_all() {
    let env = env_of(&[&[2, 3, 4]]);
    let positive = for_all(range_to(input(0).rank()), |i| input(0).shape().at(i).gt(1));
    assert_eq!(positive.eval(&env).unwrap(), Value::Bool(true));
    let small = for_all(range(1, input(0).rank()), |i| input(0).shape().at(i).lt(4));
    assert_eq!(small.eval(&env).unwrap(), Value::Bool(false));
    let empty = for_all(range(0, 0), |_| Expr::from(false));
    assert_eq!(empty.eval(&env).unwrap(), Value::Bool(true));
}

#[test]
fn test_indexing_is_checked() {
    let env = env_of(&[&[2, 3], &[]]);
    assert!(matches!(
        input(0).shape().at(2).eval(&env),
        Err(Error::IndexOutOfRange { index: 2, len: 2 })
    ));
    assert!(matches!(
        input(0).shape().at(-1).eval(&env),
        Err(Error::IndexOutOfRange { index: -1, len: 2 })
    ));
    let err = input(1).shape().last().eval(&env).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { len: 0, .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_strict_rejects_variables() {
    let env = Env::new();
    assert!(matches!(
        Expr::from(Var::new()).eval(&env),
        Err(Error::UnresolvedVariable(_))
    ));
    assert!(matches!(
        (Expr::from(Var::tmpl()) + 1).eval(&env),
        Err(Error::UnresolvedVariable(_))
    ));
    assert!(matches!(
        attr("axis").eval(&env),
        Err(Error::MissingBinding(_))
    ));
}

#[test]
fn test_contains_var() {
    assert!(!input(0).shape().at(0).contains_var());
    assert!(list(2, |_| Var::tmpl()).contains_var());
    assert!(Expr::from(Var::new().range(range(0, 3))).contains_var());
    assert!(for_all(range_to(Var::new()), |i| i.gt(0)).contains_var());
}

////////////////////////////////////////////////////////////////////////////////
// Sampling

#[test]
fn test_sampling_respects_ranges() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let domains = Domains::default();
    let mut env = env_of(&[&[6]]);
    let mut ev = Eval::sampling(&mut env, &[], &mut rng, &domains);
    let bounded = Expr::from(Var::tmpl().range(range(2, input(0).shape().at(0))));
    for _ in 0..100 {
        let x = ev.eval_int(&bounded).unwrap();
        assert!((2..6).contains(&x), "{x}");
    }
    let float = Expr::from(Var::tmpl().ty(Type::Float).range(range(0.5, 1.5)));
    for _ in 0..100 {
        let x = ev.eval_float(&float).unwrap();
        assert!((0.5..1.5).contains(&x), "{x}");
    }
    let choice = Expr::from(Var::tmpl().choices(["same", "valid"]));
    for _ in 0..10 {
        let v = ev.eval(&choice).unwrap();
        assert!(v == Value::from("same") || v == Value::from("valid"));
    }
}

#[test]
fn test_sampling_positional_defaults() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let domains = Domains {
        rank: (2, 3),
        dim: (5, 6),
        dtypes: vec![DataType::Int32],
        ..Domains::default()
    };
    let mut env = Env::new();
    let mut ev = Eval::sampling(&mut env, &[], &mut rng, &domains);
    let var = Expr::from(Var::new());

    ev.set_position(Position::Rank);
    assert_eq!(ev.eval_int(&var).unwrap(), 2);
    ev.set_position(Position::Dim);
    let shape = list(ev.eval_len(&var).unwrap() - 3, |_| Var::tmpl());
    assert_eq!(ev.eval_shape(&shape).unwrap(), vec![5, 5]);
    assert_eq!(
        ev.eval_dtype(&Var::new().ty(Type::DType).into()).unwrap(),
        DataType::Int32
    );
}

#[test]
fn test_empty_domain() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let domains = Domains::default();
    let mut env = Env::new();
    let mut ev = Eval::sampling(&mut env, &[], &mut rng, &domains);
    let err = ev
        .eval(&Var::tmpl().range(range(1, 1)).into())
        .unwrap_err();
    assert!(matches!(err, Error::EmptyDomain(_)));
    assert!(err.is_recoverable());
}

#[test]
fn test_attributes_are_sampled_lazily() {
    let decls = vec![
        Attr::new("axis", Var::new().range(range(0, input(0).rank()))),
        Attr::new("twice", attr("axis") * 2),
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let domains = Domains::default();
    let mut env = env_of(&[&[2, 3, 4]]);
    {
        let mut ev = Eval::sampling(&mut env, &decls, &mut rng, &domains);
        let twice = ev.eval_int(&attr("twice")).unwrap();
        let axis = ev.env().attr("axis").and_then(Value::as_int).unwrap();
        assert!((0..3).contains(&axis));
        assert_eq!(twice, 2 * axis);
        // bound once, then reused
        assert_eq!(ev.eval_int(&attr("axis")).unwrap(), axis);
        ev.sample_attrs().unwrap();
    }
    assert_eq!(env.attrs.len(), 2);
}

#[test]
fn test_cyclic_attribute_domain() {
    let decls = vec![Attr::new("a", attr("b") + 1), Attr::new("b", attr("a") + 1)];
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let domains = Domains::default();
    let mut env = Env::new();
    let mut ev = Eval::sampling(&mut env, &decls, &mut rng, &domains);
    assert!(matches!(ev.sample_attrs(), Err(Error::Malformed(_))));
}

#[test]
fn test_sampling_is_deterministic() {
    let run = |seed| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let domains = Domains::default();
        let mut env = Env::new();
        let mut ev = Eval::sampling(&mut env, &[], &mut rng, &domains);
        ev.set_position(Position::Dim);
        ev.eval(&list(8, |_| Var::tmpl())).unwrap()
    };
    assert_eq!(run(42), run(42));
}

////////////////////////////////////////////////////////////////////////////////
// Matching

#[test]
fn test_match_shape_pattern() {
    let mut env = env_of(&[&[2, 3]]);
    let mut ev = Eval::strict(&mut env, &[]);
    let pattern = list(input(0).rank(), |_| Var::new().range(range(1, 4)));
    assert!(ev.matches(&pattern, &ints(&[2, 3])).unwrap());
    assert!(!ev.matches(&pattern, &ints(&[2, 4])).unwrap());
    assert!(!ev.matches(&pattern, &ints(&[2])).unwrap());
    assert!(!ev.matches(&pattern, &Value::Int(2)).unwrap());

    let fixed = tuple([Expr::from(Var::new()), input(0).shape().at(1)]);
    assert!(ev.matches(&fixed, &ints(&[9, 3])).unwrap());
    assert!(!ev.matches(&fixed, &ints(&[9, 4])).unwrap());
}

#[test]
fn test_match_free_condition() {
    let mut env = env_of(&[&[7]]);
    let mut ev = Eval::strict(&mut env, &[]);
    // either a copy of IN[0]'s dimension or anything
    let either = cond(
        Var::tmpl().choices([true, false]),
        input(0).shape().at(0),
        Var::tmpl().range(range(1, 3)),
    );
    assert!(ev.matches(&either, &Value::Int(7)).unwrap());
    assert!(ev.matches(&either, &Value::Int(2)).unwrap());
    assert!(!ev.matches(&either, &Value::Int(5)).unwrap());
}

#[test]
fn test_match_dtype_and_type() {
    let mut env = Env::new();
    let mut ev = Eval::strict(&mut env, &[]);
    let dtype = Expr::from(Var::dtype([DataType::Float32, DataType::Float64]));
    assert!(ev.matches(&dtype, &Value::DType(DataType::Float64)).unwrap());
    assert!(!ev.matches(&dtype, &Value::DType(DataType::Int8)).unwrap());
    assert!(!ev.matches(&dtype, &Value::Int(1)).unwrap());
    let int = Expr::from(Var::new().ty(Type::Int));
    assert!(ev.matches(&int, &Value::Int(1)).unwrap());
    assert!(!ev.matches(&int, &Value::from("x")).unwrap());
}
