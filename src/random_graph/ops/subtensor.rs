use crate::dtype::DType;
use crate::numeric_tensor::{
    AxisSelection, NumericTensor, mask_positions, resolve_scalar_index, slice_length, slice_positions,
};
use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{
    AnyOp, Operation, check_input_count, check_int_scalar, invalid_input, tensor_arg, tensor_type,
};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::value_type::ValueType;
use serde::{Deserialize, Serialize};

/// Static layout of one index: which graph inputs it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexEntry {
    Scalar,
    Slice { start: bool, stop: bool, step: bool },
    Array,
}

impl IndexEntry {
    fn num_inputs(&self) -> usize {
        match self {
            IndexEntry::Scalar | IndexEntry::Array => 1,
            IndexEntry::Slice { start, stop, step } => {
                usize::from(*start) + usize::from(*stop) + usize::from(*step)
            }
        }
    }
}

/// An index for one axis, with its parts bound to `T` (graph values, or
/// concrete numbers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index<T> {
    /// Select one position and drop the axis.
    Scalar(T),
    Slice {
        start: Option<T>,
        stop: Option<T>,
        step: Option<T>,
    },
    /// Integer positions or a boolean mask; the axis is kept.
    Array(T),
}

impl<T> Index<T> {
    pub fn full_slice() -> Self {
        Index::Slice {
            start: None,
            stop: None,
            step: None,
        }
    }

    pub fn is_full_slice(&self) -> bool {
        matches!(
            self,
            Index::Slice {
                start: None,
                stop: None,
                step: None
            }
        )
    }

    pub fn entry(&self) -> IndexEntry {
        match self {
            Index::Scalar(_) => IndexEntry::Scalar,
            Index::Slice { start, stop, step } => IndexEntry::Slice {
                start: start.is_some(),
                stop: stop.is_some(),
                step: step.is_some(),
            },
            Index::Array(_) => IndexEntry::Array,
        }
    }

    /// Bound parts in input order.
    pub fn parts(&self) -> Vec<&T> {
        match self {
            Index::Scalar(x) | Index::Array(x) => vec![x],
            Index::Slice { start, stop, step } => [start, stop, step].into_iter().flatten().collect(),
        }
    }
}

/// Basic and advanced indexing. Each array index selects positions along its
/// own axis; at most one array index per node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtensorOp {
    pub idx_list: Vec<IndexEntry>,
}

impl SubtensorOp {
    pub fn new(idx_list: Vec<IndexEntry>) -> Self {
        Self { idx_list }
    }

    pub fn apply<G: GraphBuild + ?Sized>(
        graph: &mut G,
        x: ValueId,
        indices: Vec<Index<ValueId>>,
    ) -> Result<ValueId, GraphError> {
        let idx_list = indices.iter().map(|i| i.entry()).collect();
        let mut inputs = vec![x];
        for index in &indices {
            inputs.extend(index.parts().into_iter().copied());
        }
        graph.apply_single(AnyOp::Subtensor(Self::new(idx_list)), inputs)
    }

    pub fn num_index_inputs(&self) -> usize {
        self.idx_list.iter().map(|e| e.num_inputs()).sum()
    }

    /// Bind the index inputs (everything after the indexed tensor) to the
    /// static layout.
    pub fn resolve<T: Copy>(&self, index_inputs: &[T]) -> Result<Vec<Index<T>>, GraphError> {
        if index_inputs.len() != self.num_index_inputs() {
            return Err(GraphError::WrongInputCount {
                op: self.get_name(),
                expected: self.num_index_inputs() + 1,
                got: index_inputs.len() + 1,
            });
        }
        let mut it = index_inputs.iter().copied();
        let mut take = |present: bool| if present { it.next() } else { None };
        let mut out = vec![];
        for entry in &self.idx_list {
            let index = match entry {
                IndexEntry::Scalar => Index::Scalar(take(true)),
                IndexEntry::Array => Index::Array(take(true)),
                IndexEntry::Slice { start, stop, step } => Index::Slice {
                    start: Some(take(*start)),
                    stop: Some(take(*stop)),
                    step: Some(take(*step)),
                },
            };
            out.push(match index {
                Index::Scalar(Some(x)) => Index::Scalar(x),
                Index::Array(Some(x)) => Index::Array(x),
                Index::Slice {
                    start: Some(start),
                    stop: Some(stop),
                    step: Some(step),
                } => Index::Slice { start, stop, step },
                _ => {
                    return Err(invalid_input(&self.get_name(), "index inputs do not match layout"));
                }
            });
        }
        Ok(out)
    }
}

impl Operation for SubtensorOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        let name = self.get_name();
        check_input_count(&name, inputs.len(), 1 + self.num_index_inputs())?;
        let x = graph.tensor_type(inputs[0])?;
        if self.idx_list.len() > x.rank() {
            return Err(invalid_input(
                &name,
                format!("{} indices for a tensor of rank {}", self.idx_list.len(), x.rank()),
            ));
        }
        if self.idx_list.iter().filter(|e| **e == IndexEntry::Array).count() > 1 {
            return Err(invalid_input(&name, "at most one array index is supported"));
        }
        let indices = self.resolve(&inputs[1..])?;

        let mut shape = vec![];
        for (axis, dim) in x.shape.iter().enumerate() {
            match indices.get(axis) {
                None => shape.push(*dim),
                Some(Index::Scalar(v)) => {
                    check_int_scalar(graph, &name, *v)?;
                    if let (Some(i), Some(len)) = (graph.static_int_scalar(*v), dim) {
                        resolve_scalar_index(i, axis, *len as usize)?;
                    }
                }
                Some(index @ Index::Slice { start, stop, step }) => {
                    for part in index.parts() {
                        check_int_scalar(graph, &name, *part)?;
                    }
                    if step.is_some_and(|s| graph.static_int_scalar(s) == Some(0)) {
                        return Err(invalid_input(&name, "slice step cannot be zero"));
                    }
                    if index.is_full_slice() {
                        shape.push(*dim);
                        continue;
                    }
                    let part = |p: &Option<ValueId>| match p {
                        Some(v) => graph.static_int_scalar(*v).map(Some),
                        None => Some(None),
                    };
                    let len = match (dim, part(start), part(stop), part(step)) {
                        (Some(len), Some(start), Some(stop), Some(step)) => {
                            Some(slice_length(start, stop, step, *len as usize)? as u64)
                        }
                        _ => None,
                    };
                    shape.push(len);
                }
                Some(Index::Array(v)) => {
                    let t = graph.tensor_type(*v)?;
                    if t.rank() != 1 {
                        return Err(invalid_input(&name, format!("array index {v} must be a vector")));
                    }
                    match t.dtype {
                        DType::I64 => shape.push(t.shape[0]),
                        DType::BOOL => {
                            if let (Some(a), Some(b)) = (t.shape[0], dim) {
                                if a != *b {
                                    return Err(invalid_input(
                                        &name,
                                        format!("mask of length {a} for axis of length {b}"),
                                    ));
                                }
                            }
                            let count = graph
                                .static_bool_vector(*v)
                                .map(|m| m.iter().filter(|b| **b).count() as u64);
                            shape.push(count);
                        }
                        DType::F64 => {
                            return Err(invalid_input(&name, format!("array index {v} must be integer or boolean")));
                        }
                    }
                }
            }
        }
        Ok(vec![tensor_type(x.dtype, shape)])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let name = self.get_name();
        let x = tensor_arg(&name, inputs, 0)?;
        let x_shape = x.shape();
        let positions: Vec<usize> = (1..inputs.len()).collect();
        let indices = self.resolve(&positions)?;
        let scalar = |p: &Option<usize>| -> Result<Option<i64>, EvalError> {
            match p {
                Some(i) => Ok(Some(tensor_arg(&name, inputs, *i)?.as_i64_scalar()?)),
                None => Ok(None),
            }
        };

        let mut selections = vec![];
        for (axis, index) in indices.iter().enumerate() {
            let len = x_shape[axis];
            let selection = match index {
                Index::Scalar(i) => {
                    let i = tensor_arg(&name, inputs, *i)?.as_i64_scalar()?;
                    AxisSelection::Single(resolve_scalar_index(i, axis, len)?)
                }
                Index::Slice { start, stop, step } => {
                    AxisSelection::Positions(slice_positions(scalar(start)?, scalar(stop)?, scalar(step)?, len)?)
                }
                Index::Array(i) => match tensor_arg(&name, inputs, *i)? {
                    NumericTensor::BOOL(_) => {
                        let mask = tensor_arg(&name, inputs, *i)?.to_bool_vec()?;
                        AxisSelection::Positions(mask_positions(&mask, len)?)
                    }
                    other => {
                        let positions = other
                            .to_i64_vec()?
                            .into_iter()
                            .map(|p| resolve_scalar_index(p, axis, len))
                            .collect::<Result<Vec<_>, _>>()?;
                        AxisSelection::Positions(positions)
                    }
                },
            };
            selections.push(selection);
        }
        Ok(vec![RuntimeValue::Tensor(x.select(&selections)?)])
    }

    fn get_name(&self) -> String {
        "Subtensor".to_string()
    }
}
