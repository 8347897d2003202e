use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{
    AnyOp, Operation, check_input_count, invalid_input, static_shape_entries, tensor_arg, tensor_type,
};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::value_type::ValueType;
use serde::{Deserialize, Serialize};

/// Broadcast `x` to `shape ++ x.shape[rank - keep_trailing..]`. The trailing
/// axes are left alone so core dimensions need not be spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastToOp {
    pub keep_trailing: usize,
}

impl BroadcastToOp {
    pub fn apply<G: GraphBuild + ?Sized>(
        graph: &mut G,
        x: ValueId,
        shape: ValueId,
        keep_trailing: usize,
    ) -> Result<ValueId, GraphError> {
        graph.apply_single(AnyOp::BroadcastTo(Self { keep_trailing }), vec![x, shape])
    }
}

impl Operation for BroadcastToOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        let name = self.get_name();
        check_input_count(&name, inputs.len(), 2)?;
        let x = graph.tensor_type(inputs[0])?;
        let mut target = static_shape_entries(graph, &name, inputs[1])?;
        if x.rank() < self.keep_trailing {
            return Err(invalid_input(&name, "input has fewer axes than the kept trailing axes"));
        }
        let split = x.rank() - self.keep_trailing;
        let (lead, trailing) = x.shape.split_at(split);
        if lead.len() > target.len() {
            return Err(invalid_input(&name, "cannot broadcast to a lower rank"));
        }
        let offset = target.len() - lead.len();
        for (i, dim) in lead.iter().enumerate() {
            match (target[offset + i], dim) {
                (Some(t), Some(d)) if *d != 1 && *d != t => {
                    return Err(invalid_input(&name, format!("cannot broadcast dimension {d} to {t}")));
                }
                (None, Some(d)) if *d != 1 => target[offset + i] = Some(*d),
                _ => {}
            }
        }
        target.extend_from_slice(trailing);
        Ok(vec![tensor_type(x.dtype, target)])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let name = self.get_name();
        let x = tensor_arg(&name, inputs, 0)?;
        let mut target = tensor_arg(&name, inputs, 1)?.to_shape()?;
        let x_shape = x.shape();
        let split = x_shape.len().saturating_sub(self.keep_trailing);
        target.extend_from_slice(&x_shape[split..]);
        Ok(vec![RuntimeValue::Tensor(x.broadcast_to(&target)?)])
    }

    fn get_name(&self) -> String {
        "BroadcastTo".to_string()
    }
}
