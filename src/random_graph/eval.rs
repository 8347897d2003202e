use crate::numeric_tensor::{NumericTensor, NumericTensorError};
use crate::random_graph::observer::GraphEvalObserver;
use crate::random_graph::ops::Operation;
use crate::random_graph::{GraphError, GraphRead, RandomGraph, ValueId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("No value supplied for graph input {0}")]
    MissingInput(ValueId),
    #[error("Operator {0} is missing argument {1}")]
    MissingArgument(String, usize),
    #[error("Operator {0} expected a tensor for argument {1}, got a random state")]
    UnexpectedRandomState(String, usize),
    #[error("Operator {0} expected a random state for argument {1}")]
    ExpectedRandomState(String, usize),
    #[error("Invalid parameter for {0}: {1}")]
    InvalidParameter(String, String),
    #[error("Operator {op} produced {got} outputs, expected {expected}")]
    WrongOutputCount { op: String, expected: usize, got: usize },
    #[error(transparent)]
    GraphError(#[from] GraphError),
    #[error(transparent)]
    NumericTensorError(#[from] NumericTensorError),
}

/// Concrete generator state threaded through sampling nodes.
#[derive(Debug, Clone)]
pub struct RandomState {
    rng: StdRng,
}

impl RandomState {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Tensor(NumericTensor),
    RandomState(RandomState),
}

impl RuntimeValue {
    pub fn as_tensor(&self) -> Option<&NumericTensor> {
        match self {
            RuntimeValue::Tensor(t) => Some(t),
            RuntimeValue::RandomState(_) => None,
        }
    }
}

impl From<NumericTensor> for RuntimeValue {
    fn from(value: NumericTensor) -> Self {
        RuntimeValue::Tensor(value)
    }
}

impl From<RandomState> for RuntimeValue {
    fn from(value: RandomState) -> Self {
        RuntimeValue::RandomState(value)
    }
}

impl RandomGraph {
    /// Execute the graph on concrete inputs, returning the declared outputs in
    /// order. Sampling nodes draw from the random state they consume.
    pub fn eval<T: GraphEvalObserver>(
        &self,
        inputs: &HashMap<ValueId, RuntimeValue>,
        observer: &mut T,
    ) -> Result<Vec<RuntimeValue>, EvalError> {
        let mut values: HashMap<ValueId, RuntimeValue> = HashMap::new();
        for input in self.inputs() {
            let value = inputs.get(input).ok_or(EvalError::MissingInput(*input))?;
            values.insert(*input, value.clone());
        }

        for node_id in self.toposort()? {
            let node = self.node(node_id).ok_or(GraphError::UnknownNode(node_id))?;
            let mut args = Vec::with_capacity(node.inputs.len());
            for input in &node.inputs {
                args.push(self.lookup(&values, *input)?);
            }
            let start_instant = Instant::now();
            let out = node.op.eval(&args)?;
            let end_instant = Instant::now();
            observer.on_node_executed(node_id, start_instant, end_instant);
            if out.len() != node.outputs.len() {
                return Err(EvalError::WrongOutputCount {
                    op: node.op.get_name(),
                    expected: node.outputs.len(),
                    got: out.len(),
                });
            }
            for (value_id, value) in node.outputs.iter().zip(out) {
                observer.on_value_assigned(*value_id, &value);
                values.insert(*value_id, value);
            }
        }

        self.outputs()
            .iter()
            .map(|o| self.lookup(&values, *o))
            .collect()
    }

    fn lookup(&self, values: &HashMap<ValueId, RuntimeValue>, id: ValueId) -> Result<RuntimeValue, EvalError> {
        if let Some(v) = values.get(&id) {
            return Ok(v.clone());
        }
        match self.constant_value(id) {
            Some(c) => Ok(RuntimeValue::Tensor(c.clone())),
            None => Err(GraphError::UnknownValue(id).into()),
        }
    }
}
