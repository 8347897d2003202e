mod alloc;
mod broadcast_to;
mod dimshuffle;
mod elemwise;
mod make_vector;
mod sample;
mod shape;
mod slice_length;
mod subtensor;

pub use alloc::*;
pub use broadcast_to::*;
pub use dimshuffle::*;
pub use elemwise::*;
pub use make_vector::*;
pub use sample::*;
pub use shape::*;
pub use slice_length::*;
pub use subtensor::*;

use crate::dtype::DType;
use crate::numeric_tensor::NumericTensor;
use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::{GraphError, GraphRead, ValueId};
use crate::value_type::{TensorType, ValueType};
use serde::{Deserialize, Serialize};

pub trait Operation {
    /// Output types of a node applying this op to `inputs`, or an error if the
    /// inputs are not acceptable.
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError>;

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError>;

    fn get_name(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyOp {
    Sample(SampleOp),
    DimShuffle(DimShuffleOp),
    Subtensor(SubtensorOp),
    MakeVector(MakeVectorOp),
    Shape(ShapeOp),
    BroadcastTo(BroadcastToOp),
    SliceLength(SliceLengthOp),
    Elemwise(ElemwiseOp),
    Alloc(AllocOp),
}

impl AnyOp {
    pub fn as_sample(&self) -> Option<&SampleOp> {
        match self {
            AnyOp::Sample(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_dimshuffle(&self) -> Option<&DimShuffleOp> {
        match self {
            AnyOp::DimShuffle(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_subtensor(&self) -> Option<&SubtensorOp> {
        match self {
            AnyOp::Subtensor(x) => Some(x),
            _ => None,
        }
    }

    pub fn is_shape(&self) -> bool {
        matches!(self, AnyOp::Shape(_))
    }
}

impl Operation for AnyOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        match self {
            AnyOp::Sample(x) => x.infer_types(graph, inputs),
            AnyOp::DimShuffle(x) => x.infer_types(graph, inputs),
            AnyOp::Subtensor(x) => x.infer_types(graph, inputs),
            AnyOp::MakeVector(x) => x.infer_types(graph, inputs),
            AnyOp::Shape(x) => x.infer_types(graph, inputs),
            AnyOp::BroadcastTo(x) => x.infer_types(graph, inputs),
            AnyOp::SliceLength(x) => x.infer_types(graph, inputs),
            AnyOp::Elemwise(x) => x.infer_types(graph, inputs),
            AnyOp::Alloc(x) => x.infer_types(graph, inputs),
        }
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        match self {
            AnyOp::Sample(x) => x.eval(inputs),
            AnyOp::DimShuffle(x) => x.eval(inputs),
            AnyOp::Subtensor(x) => x.eval(inputs),
            AnyOp::MakeVector(x) => x.eval(inputs),
            AnyOp::Shape(x) => x.eval(inputs),
            AnyOp::BroadcastTo(x) => x.eval(inputs),
            AnyOp::SliceLength(x) => x.eval(inputs),
            AnyOp::Elemwise(x) => x.eval(inputs),
            AnyOp::Alloc(x) => x.eval(inputs),
        }
    }

    fn get_name(&self) -> String {
        match self {
            AnyOp::Sample(x) => x.get_name(),
            AnyOp::DimShuffle(x) => x.get_name(),
            AnyOp::Subtensor(x) => x.get_name(),
            AnyOp::MakeVector(x) => x.get_name(),
            AnyOp::Shape(x) => x.get_name(),
            AnyOp::BroadcastTo(x) => x.get_name(),
            AnyOp::SliceLength(x) => x.get_name(),
            AnyOp::Elemwise(x) => x.get_name(),
            AnyOp::Alloc(x) => x.get_name(),
        }
    }
}

fn check_input_count(op: &str, inputs: usize, expected: usize) -> Result<(), GraphError> {
    if inputs != expected {
        return Err(GraphError::WrongInputCount {
            op: op.to_string(),
            expected,
            got: inputs,
        });
    }
    Ok(())
}

fn invalid_input(op: &str, message: impl Into<String>) -> GraphError {
    GraphError::InvalidInput(op.to_string(), message.into())
}

/// Static type of an `I64` scalar input, as used for lengths and indices.
fn check_int_scalar<G: GraphRead + ?Sized>(graph: &G, op: &str, value: ValueId) -> Result<(), GraphError> {
    let t = graph.tensor_type(value)?;
    if t.dtype != DType::I64 || t.rank() != 0 {
        return Err(invalid_input(op, format!("{value} must be an Int64 scalar, found {t:?}")));
    }
    Ok(())
}

/// Statically known entries of a shape-like `I64` vector input.
fn static_shape_entries<G: GraphRead + ?Sized>(
    graph: &G,
    op: &str,
    value: ValueId,
) -> Result<Vec<Option<u64>>, GraphError> {
    let t = graph.tensor_type(value)?;
    if t.dtype != DType::I64 || t.rank() != 1 {
        return Err(invalid_input(op, format!("{value} must be an Int64 vector")));
    }
    let entries = graph
        .static_int_entries(value)
        .ok_or_else(|| invalid_input(op, format!("length of {value} is not statically known")))?;
    entries
        .into_iter()
        .map(|e| match e {
            Some(d) if d < 0 => Err(invalid_input(op, format!("negative dimension {d}"))),
            Some(d) => Ok(Some(d as u64)),
            None => Ok(None),
        })
        .collect()
}

/// Numpy-style broadcasting over partially known shapes. An unknown dimension
/// is assumed to agree with any known one.
pub fn infer_broadcast_shape(shapes: &[Vec<Option<u64>>]) -> Option<Vec<Option<u64>>> {
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut output = vec![Some(1u64); rank];
    let mut saw_unknown = vec![false; rank];
    for shape in shapes {
        let offset = rank - shape.len();
        for (i, dim) in shape.iter().enumerate() {
            let o = &mut output[offset + i];
            match dim {
                Some(1) => {}
                Some(d) => match o {
                    Some(1) | None => *o = Some(*d),
                    Some(x) if x == d => {}
                    Some(_) => return None,
                },
                None => saw_unknown[offset + i] = true,
            }
        }
    }
    for (o, unknown) in output.iter_mut().zip(saw_unknown) {
        if unknown && *o == Some(1) {
            *o = None;
        }
    }
    Some(output)
}

fn tensor_arg<'a>(op: &str, inputs: &'a [RuntimeValue], index: usize) -> Result<&'a NumericTensor, EvalError> {
    match inputs.get(index) {
        Some(RuntimeValue::Tensor(t)) => Ok(t),
        Some(RuntimeValue::RandomState(_)) => Err(EvalError::UnexpectedRandomState(op.to_string(), index)),
        None => Err(EvalError::MissingArgument(op.to_string(), index)),
    }
}

fn tensor_type(dtype: DType, shape: Vec<Option<u64>>) -> ValueType {
    ValueType::Tensor(TensorType::new(dtype, shape))
}
