use crate::dtype::{DType, DTypeError, DTypeOfPrimitive};
use ndarray::{ArcArray, ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum NumericTensorError {
    #[error(transparent)]
    DTypeError(#[from] DTypeError),
    #[error(transparent)]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("Cannot broadcast shape {0:?} to {1:?}")]
    BroadcastError(Vec<usize>, Vec<usize>),
    #[error("Shapes {0:?} are not broadcast compatible")]
    IncompatibleShapes(Vec<Vec<usize>>),
    #[error("Index {index} is out of bounds for axis {axis} with length {len}")]
    IndexOutOfBounds { index: i64, axis: usize, len: usize },
    #[error("Slice step cannot be zero")]
    ZeroSliceStep,
    #[error("Boolean mask of length {0} does not match axis length {1}")]
    MaskLengthMismatch(usize, usize),
    #[error("Invalid dimshuffle order {0:?} for a tensor of shape {1:?}")]
    InvalidOrder(Vec<Option<usize>>, Vec<usize>),
    #[error("Too many indices ({0}) for a tensor of rank {1}")]
    TooManyIndices(usize, usize),
    #[error("Expected a scalar, found shape {0:?}")]
    NotAScalar(Vec<usize>),
    #[error("Negative dimension {0}")]
    NegativeDimension(i64),
}

/// Dynamic-rank tensor used for graph constants and by the reference evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NumericTensor {
    F64(ArcArray<f64, IxDyn>),
    I64(ArcArray<i64, IxDyn>),
    BOOL(ArcArray<bool, IxDyn>),
}

macro_rules! map_variants {
    ($t:expr, $a:ident => $body:expr) => {
        match $t {
            NumericTensor::F64($a) => NumericTensor::F64($body),
            NumericTensor::I64($a) => NumericTensor::I64($body),
            NumericTensor::BOOL($a) => NumericTensor::BOOL($body),
        }
    };
}

pub trait NumericTensorType: DTypeOfPrimitive + Clone + Sized {
    fn wrap(array: ArcArray<Self, IxDyn>) -> NumericTensor;
}

impl NumericTensorType for f64 {
    fn wrap(array: ArcArray<Self, IxDyn>) -> NumericTensor {
        NumericTensor::F64(array)
    }
}

impl NumericTensorType for i64 {
    fn wrap(array: ArcArray<Self, IxDyn>) -> NumericTensor {
        NumericTensor::I64(array)
    }
}

impl NumericTensorType for bool {
    fn wrap(array: ArcArray<Self, IxDyn>) -> NumericTensor {
        NumericTensor::BOOL(array)
    }
}

/// Selection applied to one axis by an indexing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelection {
    /// Select one position and drop the axis.
    Single(usize),
    /// Keep the axis, gathering these positions in order.
    Positions(Vec<usize>),
}

impl NumericTensor {
    pub fn from_vec_shape<T: NumericTensorType>(
        values: Vec<T>,
        shape: Vec<usize>,
    ) -> Result<Self, NumericTensorError> {
        let array = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
        Ok(T::wrap(array.into_shared()))
    }

    pub fn from_vec<T: NumericTensorType>(values: Vec<T>) -> Self {
        T::wrap(ndarray::Array1::from_vec(values).into_dyn().into_shared())
    }

    pub fn scalar<T: NumericTensorType>(value: T) -> Self {
        T::wrap(ArrayD::from_elem(IxDyn(&[]), value).into_shared())
    }

    pub fn from_array(array: ArrayD<f64>) -> Self {
        NumericTensor::F64(array.into_shared())
    }

    pub fn dtype(&self) -> DType {
        match self {
            NumericTensor::F64(_) => DType::F64,
            NumericTensor::I64(_) => DType::I64,
            NumericTensor::BOOL(_) => DType::BOOL,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            NumericTensor::F64(x) => x.shape().to_vec(),
            NumericTensor::I64(x) => x.shape().to_vec(),
            NumericTensor::BOOL(x) => x.shape().to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    pub fn to_f64_array(&self) -> Result<ArrayD<f64>, NumericTensorError> {
        match self {
            NumericTensor::F64(x) => Ok(x.to_owned()),
            NumericTensor::I64(x) => Ok(x.mapv(|v| v as f64)),
            NumericTensor::BOOL(_) => {
                Err(DTypeError::WrongDType(DType::F64, DType::BOOL).into())
            }
        }
    }

    pub fn to_i64_array(&self) -> Result<ArrayD<i64>, NumericTensorError> {
        match self {
            NumericTensor::I64(x) => Ok(x.to_owned()),
            other => Err(DTypeError::WrongDType(DType::I64, other.dtype()).into()),
        }
    }

    pub fn to_f64_vec(&self) -> Result<Vec<f64>, NumericTensorError> {
        Ok(self.to_f64_array()?.iter().copied().collect())
    }

    pub fn to_i64_vec(&self) -> Result<Vec<i64>, NumericTensorError> {
        match self {
            NumericTensor::I64(x) => Ok(x.iter().copied().collect()),
            other => Err(DTypeError::WrongDType(DType::I64, other.dtype()).into()),
        }
    }

    pub fn to_bool_vec(&self) -> Result<Vec<bool>, NumericTensorError> {
        match self {
            NumericTensor::BOOL(x) => Ok(x.iter().copied().collect()),
            other => Err(DTypeError::WrongDType(DType::BOOL, other.dtype()).into()),
        }
    }

    pub fn as_i64_scalar(&self) -> Result<i64, NumericTensorError> {
        if self.rank() != 0 {
            return Err(NumericTensorError::NotAScalar(self.shape()));
        }
        let values = self.to_i64_vec()?;
        values
            .first()
            .copied()
            .ok_or_else(|| NumericTensorError::NotAScalar(self.shape()))
    }

    /// Interpret an `I64` vector as a shape.
    pub fn to_shape(&self) -> Result<Vec<usize>, NumericTensorError> {
        self.to_i64_vec()?
            .into_iter()
            .map(|d| usize::try_from(d).map_err(|_| NumericTensorError::NegativeDimension(d)))
            .collect()
    }

    /// Reorder axes; `None` entries insert a new length-1 axis. Axes that are
    /// not mentioned must have length 1 and are dropped.
    pub fn dimshuffle(&self, order: &[Option<usize>]) -> Result<Self, NumericTensorError> {
        Ok(map_variants!(self, a => dimshuffle_array(a, order)?))
    }

    pub fn select(&self, selections: &[AxisSelection]) -> Result<Self, NumericTensorError> {
        Ok(map_variants!(self, a => select_array(a, selections)?))
    }

    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self, NumericTensorError> {
        Ok(map_variants!(self, a => broadcast_array(a, shape)?))
    }
}

fn dimshuffle_array<T: Clone>(
    a: &ArcArray<T, IxDyn>,
    order: &[Option<usize>],
) -> Result<ArcArray<T, IxDyn>, NumericTensorError> {
    let shape = a.shape().to_vec();
    let invalid = || NumericTensorError::InvalidOrder(order.to_vec(), shape.clone());
    let kept: Vec<usize> = order.iter().flatten().copied().collect();
    for (i, k) in kept.iter().enumerate() {
        if *k >= shape.len() || kept[..i].contains(k) {
            return Err(invalid());
        }
    }
    let dropped: Vec<usize> = (0..shape.len()).filter(|x| !kept.contains(x)).collect();
    if dropped.iter().any(|d| shape[*d] != 1) {
        return Err(invalid());
    }

    let mut view = a.view();
    for axis in dropped.iter().rev() {
        view = view.index_axis_move(Axis(*axis), 0);
    }
    let remaining: Vec<usize> = (0..shape.len()).filter(|x| !dropped.contains(x)).collect();
    let mut perm = Vec::with_capacity(kept.len());
    for k in &kept {
        perm.push(remaining.iter().position(|r| r == k).ok_or_else(invalid)?);
    }
    let mut view = view.permuted_axes(perm);
    for (position, entry) in order.iter().enumerate() {
        if entry.is_none() {
            view = view.insert_axis(Axis(position));
        }
    }
    Ok(view.to_owned().into_shared())
}

fn select_array<T: Clone>(
    a: &ArcArray<T, IxDyn>,
    selections: &[AxisSelection],
) -> Result<ArcArray<T, IxDyn>, NumericTensorError> {
    let shape = a.shape().to_vec();
    if selections.len() > shape.len() {
        return Err(NumericTensorError::TooManyIndices(selections.len(), shape.len()));
    }
    let mut out_shape = vec![];
    for (axis, &len) in shape.iter().enumerate() {
        match selections.get(axis) {
            Some(AxisSelection::Single(p)) => {
                if *p >= len {
                    return Err(NumericTensorError::IndexOutOfBounds { index: *p as i64, axis, len });
                }
            }
            Some(AxisSelection::Positions(ps)) => {
                if let Some(p) = ps.iter().find(|p| **p >= len) {
                    return Err(NumericTensorError::IndexOutOfBounds { index: *p as i64, axis, len });
                }
                out_shape.push(ps.len());
            }
            None => out_shape.push(len),
        }
    }

    let out = ArrayD::from_shape_fn(IxDyn(&out_shape), |idx| {
        let mut src = Vec::with_capacity(shape.len());
        let mut k = 0;
        for axis in 0..shape.len() {
            match selections.get(axis) {
                Some(AxisSelection::Single(p)) => src.push(*p),
                Some(AxisSelection::Positions(ps)) => {
                    src.push(ps[idx[k]]);
                    k += 1;
                }
                None => {
                    src.push(idx[k]);
                    k += 1;
                }
            }
        }
        a[src.as_slice()].clone()
    });
    Ok(out.into_shared())
}

fn broadcast_array<T: Clone>(
    a: &ArcArray<T, IxDyn>,
    shape: &[usize],
) -> Result<ArcArray<T, IxDyn>, NumericTensorError> {
    let view = a
        .broadcast(IxDyn(shape))
        .ok_or_else(|| NumericTensorError::BroadcastError(a.shape().to_vec(), shape.to_vec()))?;
    Ok(view.to_owned().into_shared())
}

/// Numpy-style broadcasting of several shapes.
pub fn broadcast_shapes(shapes: &[Vec<usize>]) -> Result<Vec<usize>, NumericTensorError> {
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1usize; rank];
    for shape in shapes {
        let offset = rank - shape.len();
        for (i, &d) in shape.iter().enumerate() {
            let o = &mut out[offset + i];
            if d == 1 {
                continue;
            }
            if *o == 1 || *o == d {
                *o = d;
            } else {
                return Err(NumericTensorError::IncompatibleShapes(shapes.to_vec()));
            }
        }
    }
    Ok(out)
}

pub fn resolve_scalar_index(index: i64, axis: usize, len: usize) -> Result<usize, NumericTensorError> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(NumericTensorError::IndexOutOfBounds { index, axis, len });
    }
    Ok(resolved as usize)
}

/// Python `slice.indices`: normalized `(start, stop, step)` for an axis of `len`.
pub fn slice_indices(
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    len: usize,
) -> Result<(i64, i64, i64), NumericTensorError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(NumericTensorError::ZeroSliceStep);
    }
    let len = len as i64;
    let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
    let clamp = |v: i64| {
        if v < 0 {
            (v + len).max(lower)
        } else {
            v.min(upper)
        }
    };
    let start = match start {
        Some(v) => clamp(v),
        None if step < 0 => upper,
        None => lower,
    };
    let stop = match stop {
        Some(v) => clamp(v),
        None if step < 0 => lower,
        None => upper,
    };
    Ok((start, stop, step))
}

pub fn slice_length(
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    len: usize,
) -> Result<usize, NumericTensorError> {
    let (start, stop, step) = slice_indices(start, stop, step, len)?;
    let n = if step > 0 {
        if start < stop { (stop - start - 1) / step + 1 } else { 0 }
    } else if stop < start {
        (start - stop - 1) / (-step) + 1
    } else {
        0
    };
    Ok(n as usize)
}

pub fn slice_positions(
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    len: usize,
) -> Result<Vec<usize>, NumericTensorError> {
    let n = slice_length(start, stop, step, len)?;
    let (start, _, step) = slice_indices(start, stop, step, len)?;
    Ok((0..n as i64).map(|i| (start + i * step) as usize).collect())
}

pub fn mask_positions(mask: &[bool], len: usize) -> Result<Vec<usize>, NumericTensorError> {
    if mask.len() != len {
        return Err(NumericTensorError::MaskLengthMismatch(mask.len(), len));
    }
    Ok(mask.iter().enumerate().filter(|(_, m)| **m).map(|(i, _)| i).collect())
}
