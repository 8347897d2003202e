use crate::numeric_tensor::NumericTensor;
use crate::random_graph::ops::{Operation, SampleOp};
use crate::random_graph::{Client, GraphBuild, GraphError, GraphPatch, GraphRead, NodeId, RandomGraph, ValueId};

/// Why a sampling node cannot be moved relative to its consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageReason {
    RandomStateObserved(Client),
    DeclaredOutput(usize),
    OtherClient(NodeId),
    ShapeOfUnknownShape(NodeId),
}

impl std::fmt::Display for UsageReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageReason::RandomStateObserved(client) => write!(f, "random state output is consumed by {client:?}"),
            UsageReason::DeclaredOutput(i) => write!(f, "sample is declared output {i}"),
            UsageReason::OtherClient(node) => write!(f, "sample is consumed by {node}"),
            UsageReason::ShapeOfUnknownShape(node) => {
                write!(f, "{node} reads the shape of a sample whose shape is not static")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RvUsage {
    Used(UsageReason),
    /// Only the excluded nodes and these shape-only consumers read the sample.
    Unused { shape_clients: Vec<NodeId> },
}

/// Classify the consumers of a sampling node.
///
/// The node is used if its random-state output has any consumer, if its
/// sample is a declared graph output, or if the sample is consumed by a node
/// outside `excluded`. `Shape` consumers only observe the static shape and are
/// tolerated when that shape is fully known.
pub fn rv_usage(graph: &RandomGraph, rv_node: NodeId, excluded: &[NodeId]) -> Result<RvUsage, GraphError> {
    let node = graph.node(rv_node).ok_or(GraphError::UnknownNode(rv_node))?;
    if node.op.as_sample().is_none() {
        return Err(GraphError::InvalidInput(
            node.op.get_name(),
            format!("{rv_node} is not a sampling node"),
        ));
    }
    let output = |index: usize| {
        node.outputs
            .get(index)
            .copied()
            .ok_or(GraphError::UnknownNode(rv_node))
    };
    let rng_out = output(SampleOp::RNG_OUTPUT)?;
    let sample = output(SampleOp::SAMPLE_OUTPUT)?;

    if let Some(client) = graph.clients(rng_out).first() {
        return Ok(RvUsage::Used(UsageReason::RandomStateObserved(*client)));
    }
    let static_shape = graph.tensor_type(sample)?.static_shape().is_some();
    let mut shape_clients = vec![];
    for client in graph.clients(sample) {
        match client {
            Client::Output(i) => return Ok(RvUsage::Used(UsageReason::DeclaredOutput(*i))),
            Client::Node(n, _) if excluded.contains(n) => {}
            Client::Node(n, _) => {
                if !graph.node(*n).is_some_and(|c| c.op.is_shape()) {
                    return Ok(RvUsage::Used(UsageReason::OtherClient(*n)));
                }
                if !static_shape {
                    return Ok(RvUsage::Used(UsageReason::ShapeOfUnknownShape(*n)));
                }
                if !shape_clients.contains(n) {
                    shape_clients.push(*n);
                }
            }
        }
    }
    Ok(RvUsage::Unused { shape_clients })
}

pub fn is_rv_used_in_graph(graph: &RandomGraph, rv_node: NodeId, excluded: &[NodeId]) -> Result<bool, GraphError> {
    Ok(matches!(rv_usage(graph, rv_node, excluded)?, RvUsage::Used(_)))
}

/// Constant stand-ins for the outputs of shape-only consumers of `sample`,
/// so the old sampling node has no consumers left after a lift.
pub(crate) fn detach_shape_clients(
    patch: &mut GraphPatch,
    sample: ValueId,
    shape_clients: &[NodeId],
) -> Result<Vec<(ValueId, ValueId)>, GraphError> {
    if shape_clients.is_empty() {
        return Ok(vec![]);
    }
    let t = patch.tensor_type(sample)?;
    let shape: Vec<i64> = t
        .static_shape()
        .ok_or_else(|| GraphError::InvalidInput("Shape".to_string(), format!("shape of {sample} is not static")))?
        .into_iter()
        .map(|d| d as i64)
        .collect();
    let mut pairs = vec![];
    for n in shape_clients {
        let outputs = patch.node(*n).ok_or(GraphError::UnknownNode(*n))?.outputs.clone();
        for output in outputs {
            let constant = patch.add_constant(NumericTensor::from_vec(shape.clone()));
            pairs.push((output, constant));
        }
    }
    Ok(pairs)
}
