use crate::numeric_tensor::{NumericTensor, slice_length};
use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{AnyOp, Operation, check_input_count, check_int_scalar, tensor_arg, tensor_type};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::dtype::DType;
use crate::value_type::ValueType;
use serde::{Deserialize, Serialize};

/// Number of positions a slice selects from an axis of a given length.
/// Inputs are `[len, start?, stop?, step?]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceLengthOp {
    pub start: bool,
    pub stop: bool,
    pub step: bool,
}

impl SliceLengthOp {
    pub fn apply<G: GraphBuild + ?Sized>(
        graph: &mut G,
        len: ValueId,
        start: Option<ValueId>,
        stop: Option<ValueId>,
        step: Option<ValueId>,
    ) -> Result<ValueId, GraphError> {
        let op = Self {
            start: start.is_some(),
            stop: stop.is_some(),
            step: step.is_some(),
        };
        let mut inputs = vec![len];
        inputs.extend([start, stop, step].into_iter().flatten());
        graph.apply_single(AnyOp::SliceLength(op), inputs)
    }

    fn num_inputs(&self) -> usize {
        1 + usize::from(self.start) + usize::from(self.stop) + usize::from(self.step)
    }
}

impl Operation for SliceLengthOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        let name = self.get_name();
        check_input_count(&name, inputs.len(), self.num_inputs())?;
        for input in inputs {
            check_int_scalar(graph, &name, *input)?;
        }
        Ok(vec![tensor_type(DType::I64, vec![])])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let name = self.get_name();
        let mut values = (0..inputs.len()).map(|i| tensor_arg(&name, inputs, i)?.as_i64_scalar().map_err(EvalError::from));
        let len = values.next().ok_or_else(|| EvalError::MissingArgument(name.clone(), 0))??;
        let mut part = |present: bool| -> Result<Option<i64>, EvalError> {
            if present { values.next().transpose() } else { Ok(None) }
        };
        let (start, stop, step) = (part(self.start)?, part(self.stop)?, part(self.step)?);
        let len = usize::try_from(len).map_err(|_| EvalError::InvalidParameter(name.clone(), format!("negative length {len}")))?;
        let n = slice_length(start, stop, step, len)?;
        Ok(vec![RuntimeValue::Tensor(NumericTensor::scalar(n as i64))])
    }

    fn get_name(&self) -> String {
        "SliceLength".to_string()
    }
}
