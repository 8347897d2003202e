use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DTypeError {
    #[error("Expected dtype {0}, but found {1}")]
    WrongDType(DType, DType),
    #[error("The dtype {0} is not supported by operation {1}")]
    UnsupportedForOperation(DType, String),
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum DType {
    F64,
    I64,
    BOOL,
}

impl DType {
    /// Result dtype of a broadcasting arithmetic op between two operands.
    pub fn promote(a: DType, b: DType) -> Result<DType, DTypeError> {
        match (a, b) {
            (DType::BOOL, _) => Err(DTypeError::UnsupportedForOperation(a, "arithmetic".to_string())),
            (_, DType::BOOL) => Err(DTypeError::UnsupportedForOperation(b, "arithmetic".to_string())),
            (DType::I64, DType::I64) => Ok(DType::I64),
            _ => Ok(DType::F64),
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::F64 => write!(f, "Float64"),
            DType::I64 => write!(f, "Int64"),
            DType::BOOL => write!(f, "Bool"),
        }
    }
}

pub trait DTypeOfPrimitive {
    const DTYPE: DType;
}

impl DTypeOfPrimitive for f64 { const DTYPE: DType = DType::F64; }
impl DTypeOfPrimitive for i64 { const DTYPE: DType = DType::I64; }
impl DTypeOfPrimitive for bool { const DTYPE: DType = DType::BOOL; }
