pub mod dimshuffle_lift;
pub mod equilibrium;
pub mod observer;
pub mod size_lift;
pub mod subtensor_lift;
pub mod usage;

pub use equilibrium::{EquilibriumOutcome, EquilibriumReport, EquilibriumRewriter};
pub use observer::RewriteObserver;
pub use usage::{RvUsage, UsageReason, is_rv_used_in_graph, rv_usage};

use crate::numeric_tensor::NumericTensor;
use crate::random_graph::ops::{AnyOp, Index, MakeVectorOp, SampleOp, SubtensorOp};
use crate::random_graph::{GraphBuild, GraphError, GraphPatch, GraphRead, NodeId, RandomGraph, Replacement, ValueId};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error(transparent)]
    GraphError(#[from] GraphError),
    #[error("Rule {rule} produced an invalid replacement for node {node}: {source}")]
    InvalidReplacement {
        rule: String,
        node: NodeId,
        source: GraphError,
    },
}

/// A local rewrite rule. Rules only read the graph; they answer with a
/// replacement for every output of `node`, or `None` to decline.
pub trait LocalRewrite {
    fn name(&self) -> String;

    fn transform(&self, graph: &RandomGraph, node: NodeId) -> Result<Option<Replacement>, RewriteError>;
}

/// The lift rules, registered under their canonical names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LiftRewrite {
    RvSizeLift,
    DimshuffleRvLift,
    SubtensorRvLift,
}

impl LocalRewrite for LiftRewrite {
    fn name(&self) -> String {
        self.to_string()
    }

    fn transform(&self, graph: &RandomGraph, node: NodeId) -> Result<Option<Replacement>, RewriteError> {
        match self {
            LiftRewrite::RvSizeLift => size_lift::local_rv_size_lift(graph, node),
            LiftRewrite::DimshuffleRvLift => dimshuffle_lift::local_dimshuffle_rv_lift(graph, node),
            LiftRewrite::SubtensorRvLift => subtensor_lift::local_subtensor_rv_lift(graph, node),
        }
    }
}

/// A sampling node feeding a structural op through its sample output.
pub(crate) struct LiftSite<'g> {
    pub rv_node: NodeId,
    pub rv_op: &'g SampleOp,
    pub rng: ValueId,
    pub size: ValueId,
    pub params: &'g [ValueId],
    pub sample: ValueId,
}

impl<'g> LiftSite<'g> {
    /// Match `value` as the sample output of a sampling node.
    pub fn of_sample(graph: &'g RandomGraph, value: ValueId) -> Result<Option<Self>, RewriteError> {
        let Some((rv_node, node, index)) = graph.owner(value) else {
            return Ok(None);
        };
        let Some(rv_op) = node.op.as_sample() else {
            return Ok(None);
        };
        if index != SampleOp::SAMPLE_OUTPUT {
            return Ok(None);
        }
        let (rng, size, params) = rv_op.split_inputs(&node.inputs)?;
        Ok(Some(Self {
            rv_node,
            rv_op,
            rng,
            size,
            params,
            sample: value,
        }))
    }
}

/// One scalar value per entry of a size vector, reusing `MakeVector` inputs
/// and constants where possible.
pub(crate) fn size_entry_values(patch: &mut GraphPatch, size: ValueId) -> Result<Vec<ValueId>, GraphError> {
    if let Some(values) = patch.constant_value(size).map(|c| c.to_i64_vec()).transpose()? {
        return Ok(values.into_iter().map(|v| patch.int_constant(v)).collect());
    }
    if let Some((_, node, _)) = patch.owner(size) {
        if let AnyOp::MakeVector(_) = node.op {
            return Ok(node.inputs.clone());
        }
    }
    let entries = patch
        .static_int_entries(size)
        .ok_or_else(|| GraphError::InvalidInput("size".to_string(), format!("length of {size} is unknown")))?;
    let mut out = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        match entry {
            Some(v) => out.push(patch.int_constant(v)),
            None => {
                let position = patch.int_constant(i as i64);
                out.push(SubtensorOp::apply(patch, size, vec![Index::Scalar(position)])?);
            }
        }
    }
    Ok(out)
}

/// Pack scalar entries into a size vector: a constant when every entry is
/// constant, otherwise a `MakeVector`.
pub(crate) fn build_size(patch: &mut GraphPatch, entries: Vec<ValueId>) -> Result<ValueId, GraphError> {
    let constants: Option<Vec<i64>> = entries.iter().map(|e| patch.static_int_scalar(*e)).collect();
    match constants {
        Some(values) => Ok(patch.add_constant(NumericTensor::from_vec(values))),
        None => MakeVectorOp::apply(patch, entries),
    }
}

pub(crate) fn empty_size(patch: &mut GraphPatch) -> ValueId {
    patch.add_constant(NumericTensor::from_vec(Vec::<i64>::new()))
}
