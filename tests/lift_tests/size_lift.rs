use crate::lift_tests::{LiftRunner, RvGraph, assert_allclose, init_logging, sample_params};
use randgraph::ValueId;
use randgraph::random_graph::GraphRead;
use randgraph::random_graph::ops::Distribution;
use randgraph::rewrite::LiftRewrite;

/// Run the size lift with `x` as the only output and check that the size is
/// gone, the output type is unchanged and the draws are identical.
fn lift_size(runner: &LiftRunner, mut rv: RvGraph, x: ValueId) {
    init_logging();
    rv.graph.set_outputs(vec![x]).unwrap();
    let original = rv.graph.clone();
    let mut rewritten = rv.graph.clone();
    runner.run(&mut rewritten, LiftRewrite::RvSizeLift);
    rewritten.validate().unwrap();

    let out = rewritten.outputs()[0];
    let (_, node, _) = rewritten.owner(out).unwrap();
    let op = node.op.as_sample().unwrap();
    let (_, size, _) = op.split_inputs(&node.inputs).unwrap();
    assert_eq!(rewritten.static_int_entries(size), Some(vec![]));
    assert_eq!(
        rewritten.tensor_type(out).unwrap(),
        original.tensor_type(original.outputs()[0]).unwrap()
    );

    let base = crate::lift_tests::eval_graph(&original, &rv.values);
    let opt = crate::lift_tests::eval_graph(&rewritten, &rv.values);
    assert_allclose(&opt[0], &base[0], 1e-12, 0.0);
}

pub fn test_size_lift_scalar_params_without_size(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![1.0], &[]);
    let std = rv.param("std", vec![5.0], &[]);
    let x = rv.sample(Distribution::Normal, &[], vec![mean, std]);
    lift_size(runner, rv, x);
}

pub fn test_size_lift_vector_params_without_size(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![0.0, 1.0], &[2]);
    let std = rv.param("std", vec![5.0], &[]);
    let x = rv.sample(Distribution::Normal, &[], vec![mean, std]);
    lift_size(runner, rv, x);
}

pub fn test_size_lift_broadcasts_params(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![0.0, 1.0], &[2]);
    let std = rv.param("std", vec![5.0], &[]);
    let x = rv.sample(Distribution::Normal, &[3, 2], vec![mean, std]);
    lift_size(runner, rv, x);
}

pub fn test_size_lift_multivariate(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![0.0, 10.0, 100.0], &[3, 1]);
    let cov = rv.param("cov", vec![1e-6], &[1, 1]);
    let x = rv.sample(Distribution::MultivariateNormal, &[2, 3], vec![mean, cov]);
    lift_size(runner, rv, x);
}

pub fn test_size_lift_dirichlet(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let alpha = rv.param(
        "alpha",
        vec![100.0, 1.0, 1.0, 1.0, 100.0, 1.0, 1.0, 1.0, 100.0],
        &[3, 3],
    );
    let x = rv.sample(Distribution::Dirichlet, &[2, 3], vec![alpha]);
    lift_size(runner, rv, x);
}

/// Parameters that already have the batch shape of the size need no
/// broadcast.
pub fn test_size_lift_implied_size(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], &[3, 2]);
    let std = rv.param("std", vec![1.0; 6], &[3, 2]);
    let x = rv.sample(Distribution::Normal, &[3, 2], vec![mean, std]);
    let mut graph = rv.graph.clone();
    graph.set_outputs(vec![x]).unwrap();
    runner.run(&mut graph, LiftRewrite::RvSizeLift);
    let out = graph.outputs()[0];
    assert_eq!(sample_params(&graph, out), vec![mean, std]);
    lift_size(runner, rv, x);
}
