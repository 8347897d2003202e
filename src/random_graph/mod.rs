use crate::numeric_tensor::{NumericTensor, NumericTensorError};
use crate::random_graph::ops::{AnyOp, Operation};
use crate::value_type::{TensorType, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

pub mod eval;
pub mod observer;
pub mod ops;
pub mod patch;

pub use patch::{GraphBuild, GraphPatch, GraphRead, Replacement};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Unknown value {0}")]
    UnknownValue(ValueId),
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
    #[error("Operator {op} expects {expected} inputs, got {got}")]
    WrongInputCount {
        op: String,
        expected: usize,
        got: usize,
    },
    #[error("Invalid input for operator {0}: {1}")]
    InvalidInput(String, String),
    #[error("Replacement for node {node} has {got} outputs, expected {expected}")]
    ArityMismatch {
        node: NodeId,
        expected: usize,
        got: usize,
    },
    #[error("Replacement {new} of type {new_type} is incompatible with {old} of type {old_type}")]
    TypeMismatch {
        old: ValueId,
        old_type: ValueType,
        new: ValueId,
        new_type: ValueType,
    },
    #[error("Node {0} references value {1} which is not live in the graph")]
    DanglingValue(NodeId, ValueId),
    #[error("Output {0} references value {1} which is not live in the graph")]
    DanglingOutput(usize, ValueId),
    #[error("Replacing {0} would make the graph cyclic")]
    CyclicReplacement(ValueId),
    #[error("Graph contains a cycle")]
    Cycle,
    #[error("Client bookkeeping for value {0} is inconsistent")]
    InconsistentClients(ValueId),
    #[error(transparent)]
    NumericTensorError(#[from] NumericTensorError),
}

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValueId {
    inner: usize,
}

#[derive(Debug, Clone, Copy, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeId {
    inner: usize,
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.inner)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.inner)
    }
}

/// A consumer of a value: an input slot of a node, or a declared graph output.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Client {
    Node(NodeId, usize),
    Output(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub value_type: ValueType,
    /// Owning node and output position, `None` for inputs and constants.
    pub owner: Option<(NodeId, usize)>,
    pub constant: Option<NumericTensor>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub op: AnyOp,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
}

/// What a splice changed, so the driver can revisit the affected neighborhood.
#[derive(Debug, Clone, Default)]
pub struct SpliceOutcome {
    pub inserted: Vec<NodeId>,
    pub touched: Vec<NodeId>,
}

/// Dataflow graph of random variables and the structural ops around them.
///
/// Values and nodes live in arenas addressed by stable ids. Consumer lists are
/// maintained incrementally; nodes that stop contributing to a declared output
/// are pruned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomGraph {
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
    values: HashMap<ValueId, ValueInfo>,
    nodes: HashMap<NodeId, GraphNode>,
    clients: HashMap<ValueId, Vec<Client>>,
    next_value_id: usize,
    next_node_id: usize,
}

impl RandomGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, name: &str, value_type: ValueType) -> ValueId {
        let id = self.new_value_id();
        self.values.insert(
            id,
            ValueInfo {
                value_type,
                owner: None,
                constant: None,
                name: Some(name.to_string()),
            },
        );
        self.inputs.push(id);
        id
    }

    pub fn add_random_state(&mut self, name: &str) -> ValueId {
        self.add_input(name, ValueType::RandomState)
    }

    pub fn add_tensor_input(&mut self, name: &str, tensor_type: TensorType) -> ValueId {
        self.add_input(name, ValueType::Tensor(tensor_type))
    }

    fn new_value_id(&mut self) -> ValueId {
        let id = ValueId {
            inner: self.next_value_id,
        };
        self.next_value_id += 1;
        id
    }

    fn new_node_id(&mut self) -> NodeId {
        let id = NodeId {
            inner: self.next_node_id,
        };
        self.next_node_id += 1;
        id
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// Declare the graph outputs and drop everything that does not contribute to them.
    pub fn set_outputs(&mut self, outputs: Vec<ValueId>) -> Result<(), GraphError> {
        for (i, o) in outputs.iter().enumerate() {
            if !self.values.contains_key(o) {
                return Err(GraphError::DanglingOutput(i, *o));
            }
        }
        for clients in self.clients.values_mut() {
            clients.retain(|c| !matches!(c, Client::Output(_)));
        }
        for (i, o) in outputs.iter().enumerate() {
            self.clients.entry(*o).or_default().push(Client::Output(i));
        }
        self.outputs = outputs;
        self.prune();
        Ok(())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn contains_value(&self, id: ValueId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn clients(&self, value: ValueId) -> &[Client] {
        self.clients.get(&value).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Owning node of a value, if any.
    pub fn owner_id(&self, value: ValueId) -> Option<NodeId> {
        self.values.get(&value).and_then(|v| v.owner).map(|(n, _)| n)
    }

    pub(crate) fn next_ids(&self) -> (usize, usize) {
        (self.next_value_id, self.next_node_id)
    }

    /// Nodes in dependency order, ties broken by node id.
    pub fn toposort(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut ready = BTreeSet::new();
        for (id, node) in &self.nodes {
            let degree = node
                .inputs
                .iter()
                .filter(|i| self.owner_id(**i).is_some())
                .count();
            if degree == 0 {
                ready.insert(*id);
            }
            in_degree.insert(*id, degree);
        }
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            let node = &self.nodes[&id];
            for output in &node.outputs {
                for client in self.clients(*output) {
                    if let Client::Node(consumer, _) = client {
                        let degree = in_degree.get_mut(consumer).ok_or(GraphError::UnknownNode(*consumer))?;
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(*consumer);
                        }
                    }
                }
            }
        }
        if order.len() != self.nodes.len() {
            return Err(GraphError::Cycle);
        }
        Ok(order)
    }

    /// Replace every use of `old`, including declared outputs, with `new`.
    pub fn replace(&mut self, old: ValueId, new: ValueId) -> Result<Vec<NodeId>, GraphError> {
        let old_type = self.value_type(old)?.clone();
        let new_type = self.value_type(new)?.clone();
        if !old_type.is_compatible_with(&new_type) {
            return Err(GraphError::TypeMismatch {
                old,
                old_type,
                new,
                new_type,
            });
        }
        if self.creates_cycle(new, &HashMap::from([(old, new)]), None) {
            return Err(GraphError::CyclicReplacement(old));
        }
        let touched = self.replace_uses(old, new);
        self.prune();
        Ok(touched)
    }

    fn replace_uses(&mut self, old: ValueId, new: ValueId) -> Vec<NodeId> {
        let clients = self.clients.remove(&old).unwrap_or_default();
        let mut touched = vec![];
        for client in &clients {
            match *client {
                Client::Node(node, position) => {
                    if let Some(n) = self.nodes.get_mut(&node) {
                        n.inputs[position] = new;
                        touched.push(node);
                    }
                }
                Client::Output(position) => self.outputs[position] = new,
            }
        }
        self.clients.entry(new).or_default().extend(clients);
        touched
    }

    /// Whether `start` would become its own ancestor once every key of
    /// `substitutions` is replaced by its value.
    fn creates_cycle(
        &self,
        start: ValueId,
        substitutions: &HashMap<ValueId, ValueId>,
        patch: Option<&patch::PatchParts>,
    ) -> bool {
        let resolve = |mut v: ValueId| {
            for _ in 0..=substitutions.len() {
                match substitutions.get(&v) {
                    Some(next) if *next != v => v = *next,
                    _ => break,
                }
            }
            v
        };
        let inputs_of = |v: ValueId| -> Vec<ValueId> {
            let info = patch
                .and_then(|p| p.values.get(&v))
                .or_else(|| self.values.get(&v));
            let Some((owner, _)) = info.and_then(|i| i.owner) else {
                return vec![];
            };
            patch
                .and_then(|p| p.node(owner))
                .or_else(|| self.nodes.get(&owner))
                .map(|n| n.inputs.clone())
                .unwrap_or_default()
        };
        let mut stack = inputs_of(start);
        let mut visited = HashSet::new();
        while let Some(v) = stack.pop() {
            let v = resolve(v);
            if v == start {
                return true;
            }
            if visited.insert(v) {
                stack.extend(inputs_of(v));
            }
        }
        false
    }

    /// Atomically splice a rule's replacement in for `node`.
    ///
    /// All checks run before the graph is touched: arity, type compatibility of
    /// every substituted value, references of the new nodes, and acyclicity.
    pub fn splice(&mut self, node: NodeId, replacement: Replacement) -> Result<SpliceOutcome, GraphError> {
        let Replacement {
            parts,
            outputs,
            detached,
        } = replacement;
        let old_outputs = self
            .nodes
            .get(&node)
            .ok_or(GraphError::UnknownNode(node))?
            .outputs
            .clone();
        if outputs.len() != old_outputs.len() {
            return Err(GraphError::ArityMismatch {
                node,
                expected: old_outputs.len(),
                got: outputs.len(),
            });
        }
        let pairs: Vec<(ValueId, ValueId)> = old_outputs
            .into_iter()
            .zip(outputs)
            .chain(detached)
            .filter(|(old, new)| old != new)
            .collect();

        let lookup = |id: &ValueId| parts.values.get(id).or_else(|| self.values.get(id));
        for (old, new) in &pairs {
            let old_type = &self.values.get(old).ok_or(GraphError::UnknownValue(*old))?.value_type;
            let new_type = &lookup(new).ok_or(GraphError::UnknownValue(*new))?.value_type;
            if !old_type.is_compatible_with(new_type) {
                return Err(GraphError::TypeMismatch {
                    old: *old,
                    old_type: old_type.clone(),
                    new: *new,
                    new_type: new_type.clone(),
                });
            }
        }
        for (id, n) in &parts.nodes {
            for input in &n.inputs {
                if lookup(input).is_none() {
                    return Err(GraphError::DanglingValue(*id, *input));
                }
            }
        }
        let substitutions: HashMap<ValueId, ValueId> = pairs.iter().copied().collect();
        for (old, new) in &pairs {
            if self.creates_cycle(*new, &substitutions, Some(&parts)) {
                return Err(GraphError::CyclicReplacement(*old));
            }
        }

        let patch::PatchParts {
            values,
            nodes,
            next_value_id,
            next_node_id,
        } = parts;
        self.values.extend(values);
        let mut inserted = vec![];
        for (id, n) in nodes {
            for (position, input) in n.inputs.iter().enumerate() {
                self.clients.entry(*input).or_default().push(Client::Node(id, position));
            }
            self.nodes.insert(id, n);
            inserted.push(id);
        }
        self.next_value_id = self.next_value_id.max(next_value_id);
        self.next_node_id = self.next_node_id.max(next_node_id);

        let mut touched = vec![];
        for (old, new) in pairs {
            touched.extend(self.replace_uses(old, new));
        }
        self.prune();
        inserted.retain(|n| self.nodes.contains_key(n));
        touched.retain(|n| self.nodes.contains_key(n));
        Ok(SpliceOutcome { inserted, touched })
    }

    /// Remove nodes none of whose outputs are consumed, and unused constants.
    pub fn prune(&mut self) {
        let mut worklist: Vec<NodeId> = self.node_ids();
        while let Some(id) = worklist.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if node.outputs.iter().any(|o| !self.clients(*o).is_empty()) {
                continue;
            }
            let Some(node) = self.nodes.remove(&id) else {
                continue;
            };
            for output in &node.outputs {
                self.values.remove(output);
                self.clients.remove(output);
            }
            for (position, input) in node.inputs.iter().enumerate() {
                if let Some(clients) = self.clients.get_mut(input) {
                    clients.retain(|c| *c != Client::Node(id, position));
                }
                if let Some(owner) = self.owner_id(*input) {
                    worklist.push(owner);
                }
            }
        }
        let dead_constants: Vec<ValueId> = self
            .values
            .iter()
            .filter(|(id, info)| {
                info.owner.is_none() && !self.inputs.contains(id) && self.clients(**id).is_empty()
            })
            .map(|(id, _)| *id)
            .collect();
        for id in dead_constants {
            self.values.remove(&id);
            self.clients.remove(&id);
        }
        self.clients.retain(|_, c| !c.is_empty());
    }

    /// Check that every reference resolves to a live value and that the client
    /// lists agree with the node inputs and declared outputs.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut expected: HashMap<ValueId, Vec<Client>> = HashMap::new();
        for (id, node) in &self.nodes {
            for (position, input) in node.inputs.iter().enumerate() {
                let info = self.values.get(input).ok_or(GraphError::DanglingValue(*id, *input))?;
                let live = match info.owner {
                    Some((owner, index)) => self
                        .nodes
                        .get(&owner)
                        .is_some_and(|n| n.outputs.get(index) == Some(input)),
                    None => info.constant.is_some() || self.inputs.contains(input),
                };
                if !live {
                    return Err(GraphError::DanglingValue(*id, *input));
                }
                expected.entry(*input).or_default().push(Client::Node(*id, position));
            }
        }
        for (position, output) in self.outputs.iter().enumerate() {
            if !self.values.contains_key(output) {
                return Err(GraphError::DanglingOutput(position, *output));
            }
            expected.entry(*output).or_default().push(Client::Output(position));
        }
        let normalize = |clients: &[Client]| {
            let mut c: Vec<String> = clients.iter().map(|c| format!("{c:?}")).collect();
            c.sort();
            c
        };
        for (value, clients) in &expected {
            if normalize(clients) != normalize(self.clients(*value)) {
                return Err(GraphError::InconsistentClients(*value));
            }
        }
        for (value, clients) in &self.clients {
            if !clients.is_empty() && !expected.contains_key(value) {
                return Err(GraphError::InconsistentClients(*value));
            }
        }
        self.toposort()?;
        Ok(())
    }
}

impl GraphRead for RandomGraph {
    fn value_info(&self, id: ValueId) -> Option<&ValueInfo> {
        self.values.get(&id)
    }

    fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }
}

impl GraphBuild for RandomGraph {
    fn add_constant(&mut self, value: NumericTensor) -> ValueId {
        let id = self.new_value_id();
        let value_type = ValueType::Tensor(TensorType::fully_known(value.dtype(), &value.shape()));
        self.values.insert(
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
            if !self.values.contains_key(input) {
                return Err(GraphError::UnknownValue(*input));
            }
        }
        let output_types = op.infer_types(&*self, &inputs)?;
        let id = self.new_node_id();
        let mut outputs = vec![];
        for (index, value_type) in output_types.into_iter().enumerate() {
            let value = self.new_value_id();
            self.values.insert(
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
        for (position, input) in inputs.iter().enumerate() {
            self.clients.entry(*input).or_default().push(Client::Node(id, position));
        }
        self.nodes.insert(id, GraphNode { op, inputs, outputs });
        Ok(id)
    }
}
