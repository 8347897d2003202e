use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{AnyOp, Operation, check_input_count, invalid_input, tensor_arg, tensor_type};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::value_type::ValueType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One entry of a dimshuffle order: an input axis, or a new length-1 axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShuffleAxis {
    Axis(usize),
    Broadcast,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid dimshuffle entry {0:?}")]
pub struct ParseShuffleAxisError(String);

impl FromStr for ShuffleAxis {
    type Err = ParseShuffleAxisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "x" => Ok(ShuffleAxis::Broadcast),
            other => other
                .parse::<usize>()
                .map(ShuffleAxis::Axis)
                .map_err(|_| ParseShuffleAxisError(s.to_string())),
        }
    }
}

impl std::fmt::Display for ShuffleAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShuffleAxis::Axis(a) => write!(f, "{a}"),
            ShuffleAxis::Broadcast => write!(f, "x"),
        }
    }
}

impl ShuffleAxis {
    pub fn axis(&self) -> Option<usize> {
        match self {
            ShuffleAxis::Axis(a) => Some(*a),
            ShuffleAxis::Broadcast => None,
        }
    }

    /// Parse a comma separated order such as `"x, 1, 0"`.
    pub fn parse_order(order: &str) -> Result<Vec<ShuffleAxis>, ParseShuffleAxisError> {
        if order.trim().is_empty() {
            return Ok(vec![]);
        }
        order.split(',').map(ShuffleAxis::from_str).collect()
    }
}

/// Axis permutation with broadcast-axis insertion. Input axes that are not
/// mentioned in the order are dropped and must have static length 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimShuffleOp {
    pub new_order: Vec<ShuffleAxis>,
}

impl DimShuffleOp {
    pub fn new(new_order: Vec<ShuffleAxis>) -> Self {
        Self { new_order }
    }

    pub fn apply<G: GraphBuild + ?Sized>(
        graph: &mut G,
        x: ValueId,
        new_order: Vec<ShuffleAxis>,
    ) -> Result<ValueId, GraphError> {
        graph.apply_single(AnyOp::DimShuffle(Self::new(new_order)), vec![x])
    }

    pub fn is_identity(&self, input_rank: usize) -> bool {
        self.new_order.len() == input_rank
            && self
                .new_order
                .iter()
                .enumerate()
                .all(|(i, a)| *a == ShuffleAxis::Axis(i))
    }

    pub fn dropped_axes(&self, input_rank: usize) -> Vec<usize> {
        (0..input_rank)
            .filter(|i| !self.new_order.contains(&ShuffleAxis::Axis(*i)))
            .collect()
    }

    fn order_options(&self) -> Vec<Option<usize>> {
        self.new_order.iter().map(|a| a.axis()).collect()
    }
}

impl Operation for DimShuffleOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        let name = self.get_name();
        check_input_count(&name, inputs.len(), 1)?;
        let t = graph.tensor_type(inputs[0])?;
        let mut seen = vec![false; t.rank()];
        let mut shape = vec![];
        for entry in &self.new_order {
            match entry {
                ShuffleAxis::Axis(a) => {
                    if *a >= t.rank() || seen[*a] {
                        return Err(invalid_input(&name, format!("axis {a} is out of range or repeated")));
                    }
                    seen[*a] = true;
                    shape.push(t.shape[*a]);
                }
                ShuffleAxis::Broadcast => shape.push(Some(1)),
            }
        }
        for axis in self.dropped_axes(t.rank()) {
            if !t.is_broadcastable(axis) {
                return Err(invalid_input(&name, format!("cannot drop non-broadcastable axis {axis}")));
            }
        }
        Ok(vec![tensor_type(t.dtype, shape)])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let x = tensor_arg(&self.get_name(), inputs, 0)?;
        Ok(vec![RuntimeValue::Tensor(x.dimshuffle(&self.order_options())?)])
    }

    fn get_name(&self) -> String {
        let order: Vec<String> = self.new_order.iter().map(|a| a.to_string()).collect();
        format!("DimShuffle({})", order.join(","))
    }
}
