use crate::lift_tests::init_logging;
use randgraph::numeric_tensor::NumericTensor;
use randgraph::random_graph::ops::{
    AllocOp, DimShuffleOp, Distribution, ElemwiseOp, Index, Operation, SampleOp, ShapeOp, ShuffleAxis, SubtensorOp,
};
use randgraph::random_graph::{GraphBuild, GraphRead, NodeId, RandomGraph, ValueId};
use randgraph::rewrite::{EquilibriumRewriter, LiftRewrite};
use randgraph::dtype::DType;
use randgraph::value_type::TensorType;

fn apply_rule(graph: &mut RandomGraph, rule: LiftRewrite) {
    init_logging();
    EquilibriumRewriter::new(vec![rule], 100.0).apply(graph).unwrap();
    graph.validate().unwrap();
}

fn op_name(graph: &RandomGraph, value: ValueId) -> Option<String> {
    graph.owner(value).map(|(_, node, _)| node.op.get_name())
}

fn input_of(graph: &RandomGraph, value: ValueId, position: usize) -> ValueId {
    let (_, node, _) = graph.owner(value).unwrap();
    node.inputs[position]
}

fn sample_params(graph: &RandomGraph, sample: ValueId) -> Vec<ValueId> {
    let (_, node, _) = graph.owner(sample).unwrap();
    node.inputs[2..].to_vec()
}

/// `x = normal(arange(2), ones(2))`, `y = x[1]`
fn indexed_normal() -> (RandomGraph, ValueId, ValueId, NodeId) {
    let mut graph = RandomGraph::new();
    let rng = graph.add_random_state("rng");
    let mean = graph.add_constant(NumericTensor::from_vec(vec![0.0f64, 1.0]));
    let std = graph.add_constant(NumericTensor::from_vec(vec![1.0f64, 1.0]));
    let size = graph.add_constant(NumericTensor::from_vec(Vec::<i64>::new()));
    let (_, x) = SampleOp::apply(&mut graph, Distribution::Normal, rng, size, vec![mean, std]).unwrap();
    let one = graph.int_constant(1);
    let y = SubtensorOp::apply(&mut graph, x, vec![Index::Scalar(one)]).unwrap();
    let y_node = graph.owner_id(y).unwrap();
    (graph, x, y, y_node)
}

/// `x = normal(arange(2), 100, size=(2, 2, 2))`, `y = x.dimshuffle(1, 0, 2)`
fn shuffled_normal() -> (RandomGraph, ValueId, ValueId, NodeId) {
    let mut graph = RandomGraph::new();
    let rng = graph.add_random_state("rng");
    let mean = graph.add_constant(NumericTensor::from_vec(vec![0.0f64, 1.0]));
    let std = graph.add_constant(NumericTensor::scalar(100.0f64));
    let size = graph.add_constant(NumericTensor::from_vec(vec![2i64, 2, 2]));
    let (_, x) = SampleOp::apply(&mut graph, Distribution::Normal, rng, size, vec![mean, std]).unwrap();
    let order = ShuffleAxis::parse_order("1, 0, 2").unwrap();
    let y = DimShuffleOp::apply(&mut graph, x, order).unwrap();
    let y_node = graph.owner_id(y).unwrap();
    (graph, x, y, y_node)
}

/// `ones(x.shape) - y`
fn ones_like_minus(graph: &mut RandomGraph, x: ValueId, y: ValueId) -> ValueId {
    let shape = ShapeOp::apply(graph, x).unwrap();
    let ones = AllocOp::apply(graph, 1.0, shape).unwrap();
    ElemwiseOp::sub(graph, ones, y).unwrap()
}

#[test]
fn test_subtensor_lift_blocked_by_other_client() {
    let (mut graph, x, y, y_node) = indexed_normal();
    let z = ElemwiseOp::sub(&mut graph, x, y).unwrap();
    graph.set_outputs(vec![z]).unwrap();
    apply_rule(&mut graph, LiftRewrite::SubtensorRvLift);

    let subtensor_out = input_of(&graph, graph.outputs()[0], 1);
    assert_eq!(graph.owner_id(subtensor_out), Some(y_node));
    assert_eq!(op_name(&graph, subtensor_out).unwrap(), "Subtensor");
    let rv_out = input_of(&graph, subtensor_out, 0);
    assert_eq!(op_name(&graph, rv_out).unwrap(), "Sample(normal)");
}

#[test]
fn test_subtensor_lift_blocked_by_declared_output() {
    let (mut graph, x, y, _) = indexed_normal();
    let z = ones_like_minus(&mut graph, x, y);
    graph.set_outputs(vec![z, x]).unwrap();
    apply_rule(&mut graph, LiftRewrite::SubtensorRvLift);
    assert_eq!(graph.outputs(), &[z, x]);
}

#[test]
fn test_subtensor_lift_ignores_shape_client() {
    let (mut graph, x, y, _) = indexed_normal();
    let z = ones_like_minus(&mut graph, x, y);
    graph.set_outputs(vec![z]).unwrap();
    apply_rule(&mut graph, LiftRewrite::SubtensorRvLift);

    let rv_out = input_of(&graph, graph.outputs()[0], 1);
    assert_eq!(op_name(&graph, rv_out).unwrap(), "Sample(normal)");
    for param in sample_params(&graph, rv_out) {
        assert_eq!(op_name(&graph, param).unwrap(), "Subtensor");
    }
    assert!(!graph.node_ids().iter().any(|n| graph.node(*n).unwrap().op.is_shape()));
}

#[test]
fn test_subtensor_lift_blocked_by_random_state_client() {
    let (mut graph, x, y, y_node) = indexed_normal();
    let (_, rv_node, _) = graph.owner(x).unwrap();
    let rng_out = rv_node.outputs[SampleOp::RNG_OUTPUT];
    let size = graph.add_constant(NumericTensor::from_vec(Vec::<i64>::new()));
    let zero = graph.add_constant(NumericTensor::scalar(0.0f64));
    let one = graph.add_constant(NumericTensor::scalar(1.0f64));
    let (_, w) = SampleOp::apply(&mut graph, Distribution::Normal, rng_out, size, vec![zero, one]).unwrap();
    graph.set_outputs(vec![y, w]).unwrap();
    apply_rule(&mut graph, LiftRewrite::SubtensorRvLift);
    assert_eq!(graph.owner_id(graph.outputs()[0]), Some(y_node));
}

#[test]
fn test_dimshuffle_lift_blocked_by_other_client() {
    let (mut graph, x, y, y_node) = shuffled_normal();
    let z = ElemwiseOp::sub(&mut graph, x, y).unwrap();
    graph.set_outputs(vec![z, y]).unwrap();
    apply_rule(&mut graph, LiftRewrite::DimshuffleRvLift);

    let dimshuffle_out = input_of(&graph, graph.outputs()[0], 1);
    assert_eq!(graph.owner_id(dimshuffle_out), Some(y_node));
    assert!(op_name(&graph, dimshuffle_out).unwrap().starts_with("DimShuffle"));
    let rv_out = input_of(&graph, dimshuffle_out, 0);
    assert_eq!(op_name(&graph, rv_out).unwrap(), "Sample(normal)");
}

#[test]
fn test_dimshuffle_lift_blocked_by_declared_output() {
    let (mut graph, x, y, _) = shuffled_normal();
    let z = ones_like_minus(&mut graph, x, y);
    graph.set_outputs(vec![z, x]).unwrap();
    apply_rule(&mut graph, LiftRewrite::DimshuffleRvLift);
    assert_eq!(graph.outputs(), &[z, x]);
}

#[test]
fn test_dimshuffle_lift_ignores_shape_client() {
    let (mut graph, x, y, _) = shuffled_normal();
    let z = ones_like_minus(&mut graph, x, y);
    graph.set_outputs(vec![z]).unwrap();
    apply_rule(&mut graph, LiftRewrite::DimshuffleRvLift);

    let rv_out = input_of(&graph, graph.outputs()[0], 1);
    assert_eq!(op_name(&graph, rv_out).unwrap(), "Sample(normal)");
    for param in sample_params(&graph, rv_out) {
        assert!(op_name(&graph, param).unwrap().starts_with("DimShuffle"));
    }
}

#[test]
fn test_dimshuffle_lift_blocked_by_random_state_client() {
    let (mut graph, x, y, y_node) = shuffled_normal();
    let (_, rv_node, _) = graph.owner(x).unwrap();
    let rng_out = rv_node.outputs[SampleOp::RNG_OUTPUT];
    let size = graph.add_constant(NumericTensor::from_vec(Vec::<i64>::new()));
    let zero = graph.add_constant(NumericTensor::scalar(0.0f64));
    let one = graph.add_constant(NumericTensor::scalar(1.0f64));
    let (_, w) = SampleOp::apply(&mut graph, Distribution::Normal, rng_out, size, vec![zero, one]).unwrap();
    graph.set_outputs(vec![y, w]).unwrap();
    apply_rule(&mut graph, LiftRewrite::DimshuffleRvLift);

    assert_eq!(graph.owner_id(graph.outputs()[0]), Some(y_node));
    let rv_out = input_of(&graph, graph.outputs()[0], 0);
    assert_eq!(rv_out, x);
}

#[test]
fn test_dimshuffle_lift_on_sample_of_unknown_shape() {
    let mut graph = RandomGraph::new();
    let rng = graph.add_random_state("rng");
    let mean = graph.add_tensor_input("mean", TensorType::new(DType::F64, vec![None]));
    let std = graph.add_constant(NumericTensor::scalar(1.0f64));
    let size = graph.add_constant(NumericTensor::from_vec(Vec::<i64>::new()));
    let (_, x) = SampleOp::apply(&mut graph, Distribution::Normal, rng, size, vec![mean, std]).unwrap();
    let order = ShuffleAxis::parse_order("x, 0").unwrap();
    let y = DimShuffleOp::apply(&mut graph, x, order).unwrap();
    graph.set_outputs(vec![y]).unwrap();
    apply_rule(&mut graph, LiftRewrite::DimshuffleRvLift);

    let rv_out = graph.outputs()[0];
    assert_eq!(op_name(&graph, rv_out).unwrap(), "Sample(normal)");
    assert_eq!(graph.tensor_type(rv_out).unwrap().shape, vec![Some(1), None]);
    for param in sample_params(&graph, rv_out) {
        assert!(op_name(&graph, param).unwrap().starts_with("DimShuffle"));
    }
}
