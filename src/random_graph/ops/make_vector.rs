use crate::dtype::DType;
use crate::numeric_tensor::NumericTensor;
use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{AnyOp, Operation, check_int_scalar, tensor_arg, tensor_type};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::value_type::ValueType;
use serde::{Deserialize, Serialize};

/// Pack `I64` scalars into a vector, used to build symbolic sizes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MakeVectorOp {}

impl MakeVectorOp {
    pub fn apply<G: GraphBuild + ?Sized>(graph: &mut G, elements: Vec<ValueId>) -> Result<ValueId, GraphError> {
        graph.apply_single(AnyOp::MakeVector(Self {}), elements)
    }
}

impl Operation for MakeVectorOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        for input in inputs {
            check_int_scalar(graph, &self.get_name(), *input)?;
        }
        Ok(vec![tensor_type(DType::I64, vec![Some(inputs.len() as u64)])])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let name = self.get_name();
        let values = (0..inputs.len())
            .map(|i| Ok(tensor_arg(&name, inputs, i)?.as_i64_scalar()?))
            .collect::<Result<Vec<i64>, EvalError>>()?;
        Ok(vec![RuntimeValue::Tensor(NumericTensor::from_vec(values))])
    }

    fn get_name(&self) -> String {
        "MakeVector".to_string()
    }
}
