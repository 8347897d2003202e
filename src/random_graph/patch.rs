use crate::dtype::DType;
use crate::numeric_tensor::NumericTensor;
use crate::random_graph::ops::{AnyOp, Operation};
use crate::random_graph::{GraphError, GraphNode, NodeId, RandomGraph, ValueId, ValueInfo};
use crate::value_type::{TensorType, ValueType};
use std::collections::HashMap;

/// Read access shared by the graph and by patches layered on top of it.
pub trait GraphRead {
    fn value_info(&self, id: ValueId) -> Option<&ValueInfo>;
    fn node(&self, id: NodeId) -> Option<&GraphNode>;

    fn value_type(&self, id: ValueId) -> Result<&ValueType, GraphError> {
        self.value_info(id)
            .map(|v| &v.value_type)
            .ok_or(GraphError::UnknownValue(id))
    }

    fn tensor_type(&self, id: ValueId) -> Result<&TensorType, GraphError> {
        match self.value_type(id)? {
            ValueType::Tensor(t) => Ok(t),
            ValueType::RandomState => Err(GraphError::InvalidInput(
                "tensor".to_string(),
                format!("{id} is a random state"),
            )),
        }
    }

    fn constant_value(&self, id: ValueId) -> Option<&NumericTensor> {
        self.value_info(id).and_then(|v| v.constant.as_ref())
    }

    /// Owning node and output position of a value.
    fn owner(&self, id: ValueId) -> Option<(NodeId, &GraphNode, usize)> {
        let (node_id, index) = self.value_info(id)?.owner?;
        Some((node_id, self.node(node_id)?, index))
    }

    fn static_int_scalar(&self, id: ValueId) -> Option<i64> {
        self.constant_value(id)?.as_i64_scalar().ok()
    }

    fn static_bool_vector(&self, id: ValueId) -> Option<Vec<bool>> {
        self.constant_value(id)?.to_bool_vec().ok()
    }

    /// Entries of an `I64` vector as far as they are statically known.
    /// `None` if the vector length itself is unknown.
    fn static_int_entries(&self, id: ValueId) -> Option<Vec<Option<i64>>> {
        if let Some(c) = self.constant_value(id) {
            return c.to_i64_vec().ok().map(|v| v.into_iter().map(Some).collect());
        }
        if let Some((_, node, _)) = self.owner(id) {
            match &node.op {
                AnyOp::MakeVector(_) => {
                    return Some(node.inputs.iter().map(|i| self.static_int_scalar(*i)).collect());
                }
                AnyOp::Shape(_) => {
                    let t = self.tensor_type(node.inputs[0]).ok()?;
                    return Some(t.shape.iter().map(|d| d.map(|d| d as i64)).collect());
                }
                _ => {}
            }
        }
        let t = self.tensor_type(id).ok()?;
        match t.shape.as_slice() {
            [Some(len)] if t.dtype == DType::I64 => Some(vec![None; *len as usize]),
            _ => None,
        }
    }
}

/// Construction of new values and nodes with type inference.
pub trait GraphBuild: GraphRead {
    fn add_constant(&mut self, value: NumericTensor) -> ValueId;
    fn add_node(&mut self, op: AnyOp, inputs: Vec<ValueId>) -> Result<NodeId, GraphError>;

    fn apply(&mut self, op: AnyOp, inputs: Vec<ValueId>) -> Result<Vec<ValueId>, GraphError> {
        let id = self.add_node(op, inputs)?;
        Ok(self.node(id).ok_or(GraphError::UnknownNode(id))?.outputs.clone())
    }

    fn apply_single(&mut self, op: AnyOp, inputs: Vec<ValueId>) -> Result<ValueId, GraphError> {
        let name = op.get_name();
        self.apply(op, inputs)?
            .first()
            .copied()
            .ok_or_else(|| GraphError::InvalidInput(name, "operator has no outputs".to_string()))
    }

    fn int_constant(&mut self, value: i64) -> ValueId {
        self.add_constant(NumericTensor::scalar(value))
    }
}

/// New values and nodes staged by a rewrite, detached from the base graph.
#[derive(Debug, Clone, Default)]
pub struct PatchParts {
    pub(crate) values: HashMap<ValueId, ValueInfo>,
    pub(crate) nodes: Vec<(NodeId, GraphNode)>,
    pub(crate) next_value_id: usize,
    pub(crate) next_node_id: usize,
}

impl PatchParts {
    pub(crate) fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|(n, _)| *n == id).map(|(_, n)| n)
    }
}

/// A staged subgraph that reads through to a base graph without mutating it.
pub struct GraphPatch<'g> {
    base: &'g RandomGraph,
    parts: PatchParts,
}

/// A rule's answer: the replacement for each output of the rewritten node,
/// plus extra substitutions for values the rewrite makes obsolete.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub(crate) parts: PatchParts,
    pub outputs: Vec<ValueId>,
    pub detached: Vec<(ValueId, ValueId)>,
}

impl<'g> GraphPatch<'g> {
    pub fn new(base: &'g RandomGraph) -> Self {
        let (next_value_id, next_node_id) = base.next_ids();
        Self {
            base,
            parts: PatchParts {
                values: HashMap::new(),
                nodes: vec![],
                next_value_id,
                next_node_id,
            },
        }
    }

    fn new_value_id(&mut self) -> ValueId {
        let id = ValueId {
            inner: self.parts.next_value_id,
        };
        self.parts.next_value_id += 1;
        id
    }

    pub fn into_replacement(self, outputs: Vec<ValueId>, detached: Vec<(ValueId, ValueId)>) -> Replacement {
        Replacement {
            parts: self.parts,
            outputs,
            detached,
        }
    }
}

impl GraphRead for GraphPatch<'_> {
    fn value_info(&self, id: ValueId) -> Option<&ValueInfo> {
        self.parts.values.get(&id).or_else(|| self.base.value_info(id))
    }

    fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.parts.node(id).or_else(|| self.base.node(id))
    }
}

impl GraphBuild for GraphPatch<'_> {
    fn add_constant(&mut self, value: NumericTensor) -> ValueId {
        let id = self.new_value_id();
        let value_type = ValueType::Tensor(TensorType::fully_known(value.dtype(), &value.shape()));
        self.parts.values.insert(
            id,
            ValueInfo {
                value_type,
                owner: None,
                constant: Some(value),
                name: None,
            },
        );
        id
    }

    fn add_node(&mut self, op: AnyOp, inputs: Vec<ValueId>) -> Result<NodeId, GraphError> {
        for input in &inputs {
            if self.value_info(*input).is_none() {
                return Err(GraphError::UnknownValue(*input));
            }
        }
        let output_types = op.infer_types(&*self, &inputs)?;
        let id = NodeId {
            inner: self.parts.next_node_id,
        };
        self.parts.next_node_id += 1;
        let mut outputs = vec![];
        for (index, value_type) in output_types.into_iter().enumerate() {
            let value = self.new_value_id();
            self.parts.values.insert(
                value,
                ValueInfo {
                    value_type,
                    owner: Some((id, index)),
                    constant: None,
                    name: None,
                },
            );
            outputs.push(value);
        }
        self.parts.nodes.push((id, GraphNode { op, inputs, outputs }));
        Ok(id)
    }
}
