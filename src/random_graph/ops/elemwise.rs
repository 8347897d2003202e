use crate::dtype::DType;
use crate::numeric_tensor::{NumericTensor, NumericTensorError, broadcast_shapes};
use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{AnyOp, Operation, check_input_count, infer_broadcast_shape, invalid_input, tensor_arg, tensor_type};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::value_type::ValueType;
use ndarray::{ArrayD, IxDyn, Zip};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    fn apply_f64(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
        }
    }

    fn apply_i64(&self, a: i64, b: i64) -> i64 {
        match self {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
        }
    }
}

/// Broadcasting binary arithmetic. Stands in for the consumers a sample
/// can have besides the structural ops that get lifted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElemwiseOp {
    pub op: BinaryOp,
}

impl ElemwiseOp {
    pub fn apply<G: GraphBuild + ?Sized>(graph: &mut G, op: BinaryOp, a: ValueId, b: ValueId) -> Result<ValueId, GraphError> {
        graph.apply_single(AnyOp::Elemwise(Self { op }), vec![a, b])
    }

    pub fn add<G: GraphBuild + ?Sized>(graph: &mut G, a: ValueId, b: ValueId) -> Result<ValueId, GraphError> {
        Self::apply(graph, BinaryOp::Add, a, b)
    }

    pub fn sub<G: GraphBuild + ?Sized>(graph: &mut G, a: ValueId, b: ValueId) -> Result<ValueId, GraphError> {
        Self::apply(graph, BinaryOp::Sub, a, b)
    }

    pub fn mul<G: GraphBuild + ?Sized>(graph: &mut G, a: ValueId, b: ValueId) -> Result<ValueId, GraphError> {
        Self::apply(graph, BinaryOp::Mul, a, b)
    }
}

fn zip_broadcast<T: Copy>(
    a: &ArrayD<T>,
    b: &ArrayD<T>,
    f: impl Fn(T, T) -> T,
) -> Result<ArrayD<T>, NumericTensorError> {
    let shape = broadcast_shapes(&[a.shape().to_vec(), b.shape().to_vec()])?;
    let av = a
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| NumericTensorError::BroadcastError(a.shape().to_vec(), shape.clone()))?;
    let bv = b
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| NumericTensorError::BroadcastError(b.shape().to_vec(), shape.clone()))?;
    Ok(Zip::from(&av).and(&bv).map_collect(|x, y| f(*x, *y)))
}

impl Operation for ElemwiseOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        let name = self.get_name();
        check_input_count(&name, inputs.len(), 2)?;
        let a = graph.tensor_type(inputs[0])?;
        let b = graph.tensor_type(inputs[1])?;
        let dtype = DType::promote(a.dtype, b.dtype).map_err(|e| invalid_input(&name, e.to_string()))?;
        let shape = infer_broadcast_shape(&[a.shape.clone(), b.shape.clone()])
            .ok_or_else(|| invalid_input(&name, "operand shapes do not broadcast"))?;
        Ok(vec![tensor_type(dtype, shape)])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let name = self.get_name();
        let a = tensor_arg(&name, inputs, 0)?;
        let b = tensor_arg(&name, inputs, 1)?;
        let out = match DType::promote(a.dtype(), b.dtype()).map_err(NumericTensorError::from)? {
            DType::I64 => {
                let out = zip_broadcast(&a.to_i64_array()?, &b.to_i64_array()?, |x, y| self.op.apply_i64(x, y))?;
                NumericTensor::I64(out.into_shared())
            }
            _ => {
                let out = zip_broadcast(&a.to_f64_array()?, &b.to_f64_array()?, |x, y| self.op.apply_f64(x, y))?;
                NumericTensor::F64(out.into_shared())
            }
        };
        Ok(vec![RuntimeValue::Tensor(out)])
    }

    fn get_name(&self) -> String {
        format!("Elemwise({:?})", self.op)
    }
}
