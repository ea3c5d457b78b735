use thiserror::Error;

use super::ConditionId;
use crate::pose::PointId;

/// Reasons an exercise document is rejected at load time
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Failed to read exercise document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed exercise document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate condition id: {0}")]
    DuplicateCondition(ConditionId),

    #[error("Duplicate virtual point id: {0}")]
    DuplicateVirtualPoint(u32),

    #[error("Virtual point {id} references {missing} before it is declared")]
    ForwardReference { id: u32, missing: PointId },

    #[error("{context} references undeclared virtual point {point}")]
    UnknownPoint { context: String, point: PointId },

    #[error("{context} references undeclared dynamic variable '{name}'")]
    UnknownBaseline { context: String, name: String },

    #[error("Element references unknown condition '{0}'")]
    UnknownConditionRef(ConditionId),

    #[error("Invalid parameter in {context}: {reason}")]
    InvalidParameter { context: String, reason: String },
}

impl SpecError {
    pub(crate) fn invalid(context: impl Into<String>, reason: impl Into<String>) -> Self {
        SpecError::InvalidParameter {
            context: context.into(),
            reason: reason.into(),
        }
    }
}
