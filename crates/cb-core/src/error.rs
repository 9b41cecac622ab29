use thiserror::Error;

use crate::spec::{Aggregation, SpecField};

/// Errors that block a spec from being compiled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("choose a value for '{field}'")]
    MissingField { field: SpecField },

    #[error("'{aggregation}' cannot be applied to non-numeric column '{column}'; use 'count' instead")]
    IncompatibleAggregation {
        column: String,
        aggregation: Aggregation,
    },

    #[error("column '{column}' is not numeric and cannot be binned")]
    NotBinnable { column: String },

    #[error("histogram bins must be between 2 and 100, got {bins}")]
    InvalidBinCount { bins: u32 },

    #[error("column '{column}' used in '{field}' does not exist in the dataset")]
    UnknownColumn { field: SpecField, column: String },
}

impl ValidationError {
    pub fn missing(field: SpecField) -> Self {
        Self::MissingField { field }
    }

    /// The spec field the user has to fix
    pub fn field(&self) -> SpecField {
        match self {
            ValidationError::MissingField { field } => *field,
            ValidationError::IncompatibleAggregation { .. } => SpecField::Aggregation,
            ValidationError::NotBinnable { .. } => SpecField::ValueColumn,
            ValidationError::InvalidBinCount { .. } => SpecField::Bins,
            ValidationError::UnknownColumn { field, .. } => *field,
        }
    }

    /// Missing fields mean the spec is still being filled in
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ValidationError::MissingField { .. })
    }
}
