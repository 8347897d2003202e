use crate::dtype::DType;
use serde::{Deserialize, Serialize};

/// Static type of a tensor value. A `None` dimension has unknown length; a
/// dimension statically known to be 1 is broadcastable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Vec<Option<u64>>,
}

impl TensorType {
    pub fn new(dtype: DType, shape: Vec<Option<u64>>) -> Self {
        Self { dtype, shape }
    }

    pub fn fully_known(dtype: DType, shape: &[usize]) -> Self {
        Self {
            dtype,
            shape: shape.iter().map(|x| Some(*x as u64)).collect(),
        }
    }

    pub fn scalar(dtype: DType) -> Self {
        Self { dtype, shape: vec![] }
    }

    pub fn vector(dtype: DType, len: Option<u64>) -> Self {
        Self { dtype, shape: vec![len] }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_broadcastable(&self, axis: usize) -> bool {
        matches!(self.shape.get(axis), Some(Some(1)))
    }

    pub fn static_shape(&self) -> Option<Vec<u64>> {
        self.shape.iter().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Tensor(TensorType),
    RandomState,
}

impl ValueType {
    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            ValueType::Tensor(t) => Some(t),
            ValueType::RandomState => None,
        }
    }

    /// Whether a value of type `other` may stand in for a value of this type:
    /// same kind, dtype and rank, and equal lengths wherever both are known.
    pub fn is_compatible_with(&self, other: &ValueType) -> bool {
        match (self, other) {
            (ValueType::RandomState, ValueType::RandomState) => true,
            (ValueType::Tensor(a), ValueType::Tensor(b)) => {
                a.dtype == b.dtype
                    && a.rank() == b.rank()
                    && a.shape.iter().zip(&b.shape).all(|(x, y)| match (x, y) {
                        (Some(x), Some(y)) => x == y,
                        _ => true,
                    })
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::RandomState => write!(f, "RandomState"),
            ValueType::Tensor(t) => {
                let dims: Vec<String> = t
                    .shape
                    .iter()
                    .map(|d| d.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string()))
                    .collect();
                write!(f, "{}[{}]", t.dtype, dims.join(", "))
            }
        }
    }
}

impl From<TensorType> for ValueType {
    fn from(value: TensorType) -> Self {
        ValueType::Tensor(value)
    }
}
