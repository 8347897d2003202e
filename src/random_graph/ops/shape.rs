use crate::dtype::DType;
use crate::numeric_tensor::NumericTensor;
use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{AnyOp, Operation, check_input_count, tensor_arg, tensor_type};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::value_type::ValueType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeOp {}

impl ShapeOp {
    pub fn apply<G: GraphBuild + ?Sized>(graph: &mut G, x: ValueId) -> Result<ValueId, GraphError> {
        graph.apply_single(AnyOp::Shape(Self {}), vec![x])
    }
}

impl Operation for ShapeOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        check_input_count(&self.get_name(), inputs.len(), 1)?;
        let rank = graph.tensor_type(inputs[0])?.rank();
        Ok(vec![tensor_type(DType::I64, vec![Some(rank as u64)])])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let output_shape = tensor_arg(&self.get_name(), inputs, 0)?
            .shape()
            .into_iter()
            .map(|x| x as i64)
            .collect::<Vec<_>>();
        Ok(vec![RuntimeValue::Tensor(NumericTensor::from_vec(output_shape))])
    }

    fn get_name(&self) -> String {
        "Shape".to_string()
    }
}
