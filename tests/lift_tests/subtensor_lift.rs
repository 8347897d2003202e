use crate::lift_tests::{LiftRunner, RvGraph, arange, check_lift};
use randgraph::ValueId;
use randgraph::random_graph::GraphBuild;
use randgraph::random_graph::ops::{Distribution, Index, MakeVectorOp, SampleOp, SubtensorOp};
use randgraph::rewrite::LiftRewrite;

fn lift_subtensor(runner: &LiftRunner, mut rv: RvGraph, x: ValueId, indices: Vec<Index<ValueId>>, lifted: bool) {
    let out = SubtensorOp::apply(&mut rv.graph, x, indices).unwrap();
    rv.graph.set_outputs(vec![out]).unwrap();
    check_lift(runner, rv, LiftRewrite::SubtensorRvLift, lifted, "Subtensor", 1e-3);
}

fn scalar(rv: &mut RvGraph, value: i64) -> ValueId {
    rv.graph.int_constant(value)
}

pub fn test_subtensor_mask_without_size(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let high: Vec<f64> = arange(&[4]).iter().map(|v| 0.1 * v).collect();
    let low: Vec<f64> = arange(&[4]).iter().map(|v| (0.1 - 1e-5) * v).collect();
    let low = rv.param("low", low, &[4]);
    let high = rv.param("high", high, &[4]);
    let x = rv.sample(Distribution::Uniform, &[], vec![low, high]);
    let mask = rv.mask(&[true, false, false, true]);
    lift_subtensor(runner, rv, x, vec![Index::Array(mask)], true);
}

pub fn test_subtensor_mask_with_size(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let low = rv.param("low", vec![0.9 - 1e-5], &[]);
    let high = rv.param("high", vec![0.9], &[]);
    let x = rv.sample(Distribution::Uniform, &[4], vec![low, high]);
    let mask = rv.mask(&[true, false, false, true]);
    lift_subtensor(runner, rv, x, vec![Index::Array(mask)], true);
}

pub fn test_subtensor_reversed_slice_with_size(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let low = rv.param("low", vec![0.9 - 1e-5], &[]);
    let high = rv.param("high", vec![0.9], &[]);
    let x = rv.sample(Distribution::Uniform, &[5, 2], vec![low, high]);
    let start = scalar(&mut rv, 4);
    let stop = scalar(&mut rv, -6);
    let step = scalar(&mut rv, -1);
    let index = Index::Slice {
        start: Some(start),
        stop: Some(stop),
        step: Some(step),
    };
    lift_subtensor(runner, rv, x, vec![index], true);
}

pub fn test_subtensor_slice_and_array(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![1.0, 10.0, 100.0], &[3]);
    let std = rv.param("std", vec![1e-5, 2e-5, 3e-5], &[3]);
    let x = rv.sample(Distribution::Normal, &[4, 3], vec![mean, std]);
    let start = scalar(&mut rv, 1);
    let positions = rv.int_vector(&[0, 2]);
    let indices = vec![
        Index::Slice {
            start: Some(start),
            stop: None,
            step: None,
        },
        Index::Array(positions),
    ];
    lift_subtensor(runner, rv, x, indices, true);
}

/// `normal(mean=[[-1, 20], [300, -4000]], std=[[1e-6, 2e-6]], size=(3, 2, 2))[1:, [0, 1]]`
pub fn test_subtensor_slice_and_array_broadcast_std(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![-1.0, 20.0, 300.0, -4000.0], &[2, 2]);
    let std = rv.param("std", vec![1e-6, 2e-6], &[1, 2]);
    let x = rv.sample(Distribution::Normal, &[3, 2, 2], vec![mean, std]);
    let start = scalar(&mut rv, 1);
    let positions = rv.int_vector(&[0, 1]);
    let indices = vec![
        Index::Slice {
            start: Some(start),
            stop: None,
            step: None,
        },
        Index::Array(positions),
    ];
    lift_subtensor(runner, rv, x, indices, true);
}

pub fn test_subtensor_array_and_scalar(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![-1.0, 20.0, 300.0, -4000.0], &[2, 2]);
    let std = rv.param("std", vec![1e-6, 2e-6], &[1, 2]);
    let x = rv.sample(Distribution::Normal, &[3, 2, 2], vec![mean, std]);
    let positions = rv.int_vector(&[1]);
    let zero = scalar(&mut rv, 0);
    lift_subtensor(runner, rv, x, vec![Index::Array(positions), Index::Scalar(zero)], true);
}

pub fn test_subtensor_multivariate_support_axis(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![-1.0, 20.0, 300.0, -4000.0], &[2, 2]);
    let cov = rv.param("cov", vec![1e-12, 0.0, 0.0, 1e-12], &[2, 2]);
    let x = rv.sample(Distribution::MultivariateNormal, &[], vec![mean, cov]);
    let positions = rv.int_vector(&[1]);
    let zero = scalar(&mut rv, 0);
    lift_subtensor(runner, rv, x, vec![Index::Array(positions), Index::Scalar(zero)], false);
}

pub fn test_subtensor_multivariate_batch_axis(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![-1.0, 20.0, 300.0, -4000.0], &[2, 2]);
    let cov = rv.param("cov", vec![1e-12, 0.0, 0.0, 1e-12], &[2, 2]);
    let x = rv.sample(Distribution::MultivariateNormal, &[3, 2], vec![mean, cov]);
    let one = scalar(&mut rv, 1);
    let indices = vec![Index::Scalar(one), Index::full_slice(), Index::full_slice()];
    lift_subtensor(runner, rv, x, indices, true);
}

pub fn test_subtensor_poisson_scalar(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let lam = rv.param("lam", vec![1000.0, 2000.0, 3000.0, 4000.0], &[2, 2]);
    let x = rv.sample(Distribution::Poisson, &[3, 2, 2], vec![lam]);
    let zero = scalar(&mut rv, 0);
    let out = SubtensorOp::apply(&mut rv.graph, x, vec![Index::Scalar(zero)]).unwrap();
    rv.graph.set_outputs(vec![out]).unwrap();
    check_lift(runner, rv, LiftRewrite::SubtensorRvLift, true, "Subtensor", 0.2);
}

pub fn test_subtensor_symbolic_size(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![5.0], &[]);
    let std = rv.param("std", vec![1e-6], &[]);
    let n = rv.int_input("n", 6);
    let m = rv.int_input("m", 3);
    let size = MakeVectorOp::apply(&mut rv.graph, vec![n, m]).unwrap();
    let (_, x) = SampleOp::apply(&mut rv.graph, Distribution::Normal, rv.rng, size, vec![mean, std]).unwrap();
    let start = scalar(&mut rv, 1);
    let step = scalar(&mut rv, 2);
    let index = Index::Slice {
        start: Some(start),
        stop: None,
        step: Some(step),
    };
    lift_subtensor(runner, rv, x, vec![index], true);
}

/// `normal([0, 0, 0], 1)[[0, 0]]` returns one draw twice; lifting would draw it twice.
pub fn test_subtensor_repeated_positions(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![0.0, 0.0, 0.0], &[3]);
    let std = rv.param("std", vec![1.0], &[]);
    let x = rv.sample(Distribution::Normal, &[], vec![mean, std]);
    let positions = rv.int_vector(&[0, 0]);
    lift_subtensor(runner, rv, x, vec![Index::Array(positions)], false);
}

/// `-1` and `2` name the same position on an axis of length 3.
pub fn test_subtensor_aliased_negative_position(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![0.0], &[]);
    let std = rv.param("std", vec![1.0], &[]);
    let x = rv.sample(Distribution::Normal, &[3], vec![mean, std]);
    let positions = rv.int_vector(&[2, -1]);
    lift_subtensor(runner, rv, x, vec![Index::Array(positions)], false);
}

pub fn test_subtensor_symbolic_positions(runner: &LiftRunner) {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![0.0, 10.0, 20.0], &[3]);
    let std = rv.param("std", vec![1e-6], &[]);
    let x = rv.sample(Distribution::Normal, &[], vec![mean, std]);
    let i = rv.int_input("i", 2);
    let positions = MakeVectorOp::apply(&mut rv.graph, vec![i]).unwrap();
    lift_subtensor(runner, rv, x, vec![Index::Array(positions)], false);
}
