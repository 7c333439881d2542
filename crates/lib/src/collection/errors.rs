//! Collection level errors.

use thiserror::Error;

use crate::model::ModelId;

/// Errors raised by collection operations.
///
/// Structural errors are raised before any index is touched: a failed
/// operation leaves the collection exactly as it was.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollectionError {
    /// An operation needed an id and got none, or an empty one.
    #[error("Model identifier is missing")]
    IdentifierMissing,

    /// Raw model data carried no usable type information.
    #[error("Raw model data has no type information")]
    TypeRequired,

    /// No schema is registered for the requested wire tag.
    #[error("No schema is registered for type '{type_name}'")]
    UnknownType { type_name: String },

    /// The model already belongs to a different collection. Remove it
    /// there first; a model has at most one owner.
    #[error("Model {type_name}({id}) already belongs to another collection")]
    AlreadyOwned { type_name: String, id: ModelId },

    /// A view with that name already exists on this collection.
    #[error("View name '{name}' is already taken")]
    NameTaken { name: String },

    /// The model was created in a different arena than this collection's.
    #[error("Model was created in a different arena")]
    ForeignArena,

    /// Raw model data was not a JSON object.
    #[error("Raw model data must be a JSON object")]
    InvalidData,

    /// A view handle outlived its entry.
    #[error("View '{name}' does not exist in this collection")]
    UnknownView { name: String },

    /// A model of the wrong type was offered to a view.
    #[error("View '{name}' holds '{expected}' models, not '{actual}'")]
    ViewTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

impl CollectionError {
    /// Returns `true` when the model is owned by another collection.
    pub fn is_already_owned(&self) -> bool {
        matches!(self, CollectionError::AlreadyOwned { .. })
    }

    /// Returns `true` for a view name collision.
    pub fn is_name_taken(&self) -> bool {
        matches!(self, CollectionError::NameTaken { .. })
    }

    /// Returns `true` when a wire tag had no registered schema.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, CollectionError::UnknownType { .. })
    }

    /// Returns `true` when an id was required but missing or empty.
    pub fn is_identifier_missing(&self) -> bool {
        matches!(self, CollectionError::IdentifierMissing)
    }
}

// Conversion to the main Error type
impl From<CollectionError> for crate::Error {
    fn from(err: CollectionError) -> Self {
        crate::Error::Collection(err)
    }
}
