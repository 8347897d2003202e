use crate::dtype::DType;
use crate::numeric_tensor::NumericTensor;
use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{AnyOp, Operation, check_input_count, static_shape_entries, tensor_arg, tensor_type};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::value_type::ValueType;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

/// A `F64` tensor of the given shape filled with one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocOp {
    pub value: f64,
}

impl AllocOp {
    pub fn apply<G: GraphBuild + ?Sized>(graph: &mut G, value: f64, shape: ValueId) -> Result<ValueId, GraphError> {
        graph.apply_single(AnyOp::Alloc(Self { value }), vec![shape])
    }
}

impl Operation for AllocOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        let name = self.get_name();
        check_input_count(&name, inputs.len(), 1)?;
        Ok(vec![tensor_type(DType::F64, static_shape_entries(graph, &name, inputs[0])?)])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let shape = tensor_arg(&self.get_name(), inputs, 0)?.to_shape()?;
        let out = ArrayD::from_elem(IxDyn(&shape), self.value);
        Ok(vec![RuntimeValue::Tensor(NumericTensor::from_array(out))])
    }

    fn get_name(&self) -> String {
        "Alloc".to_string()
    }
}
