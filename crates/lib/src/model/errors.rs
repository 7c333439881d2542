//! Model level errors.

use thiserror::Error;

/// Errors raised by model field access and mutation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A reference operation named a field the model does not have.
    #[error("Type '{type_name}' has no reference field '{field}'")]
    UnknownField { type_name: String, field: String },

    /// A reference operation named a plain attribute field.
    #[error("Field '{field}' on type '{type_name}' is an attribute, not a reference")]
    NotAReference { type_name: String, field: String },

    /// A single-valued accessor hit a list-shaped reference or vice versa.
    #[error("Reference '{field}' currently holds a {actual} value, not {expected}")]
    CardinalityMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The model handle points at a slot its arena no longer tracks.
    #[error("Model handle is no longer backed by its arena")]
    Retired,

    /// Construction without an id under the manual id strategy.
    #[error("Type '{type_name}' assigns ids manually but no id was given")]
    MissingId { type_name: String },
}

impl ModelError {
    /// Returns `true` for reference lookups that named a missing or
    /// non-reference field.
    pub fn is_unknown_field(&self) -> bool {
        matches!(
            self,
            ModelError::UnknownField { .. } | ModelError::NotAReference { .. }
        )
    }

    /// Returns `true` when a reference was read or written with the wrong
    /// cardinality.
    pub fn is_cardinality_mismatch(&self) -> bool {
        matches!(self, ModelError::CardinalityMismatch { .. })
    }
}

// Conversion to the main Error type
impl From<ModelError> for crate::Error {
    fn from(err: ModelError) -> Self {
        crate::Error::Model(err)
    }
}
