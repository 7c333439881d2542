//!
//! Engram: a reactive client-side data store with JSON:API synchronization.
//! This library keeps a normalized graph of models in memory, tracks every
//! mutation as an observable patch, and speaks JSON:API to keep that graph
//! in step with a backend.
//!
//! ## Core Concepts
//!
//! * **Schemas (`schema::ModelSchema`, `schema::SchemaRegistry`)**: declare a type's wire tag, attribute and reference fields, id strategy and endpoint overrides.
//! * **Models (`model::Model`)**: cheap handles onto shared store slots; two handles to the same `(type, id)` observe the same state, and every write emits a [`Patch`].
//! * **Collections (`collection::Collection`)**: observable containers enforcing `(type, id)` uniqueness and single ownership, with lookup/filter queries and snapshot serialization.
//! * **Views (`view::View`)**: named, ordered, optionally deduplicated projections of one type, re-resolved live against the collection on every read.
//! * **References (`bucket::RefValue`, `bucket::RefInput`)**: model-to-model links held in buckets that serialize as identifier pairs and are scrubbed collection-wide when their target is removed.
//! * **Network adapter (`jsonapi::JsonApiClient`)**: fetch/save/destroy against a JSON:API backend, response documents normalized through the collection's own add/update paths (behind the default `jsonapi` feature).
//!
//! ```
//! use engram::{Collection, ModelSchema, SchemaRegistry};
//! use serde_json::json;
//!
//! # fn main() -> engram::Result<()> {
//! let registry = SchemaRegistry::new();
//! registry.register(
//!     ModelSchema::builder("person")
//!         .attribute("name")
//!         .to_one("spouse", "person")
//!         .build()?,
//! );
//!
//! let collection = Collection::new(registry);
//! let ada = collection.add_raw("person", json!({ "id": "1", "name": "Ada" }))?;
//! let sam = collection.add_raw(
//!     "person",
//!     json!({ "id": "2", "name": "Sam", "spouse": { "type": "person", "id": "1" } }),
//! )?;
//! assert_eq!(sam.one("spouse")?, Some(ada));
//!
//! // Removal scrubs every reference that pointed at the removed model.
//! collection.remove("person", "1")?;
//! assert_eq!(sam.one("spouse")?, None);
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod bucket;
pub mod collection;
#[cfg(feature = "jsonapi")]
pub mod jsonapi;
pub mod model;
pub mod patch;
pub mod schema;
pub mod snapshot;
pub mod view;

pub use arena::Arena;
pub use bucket::{RefInput, RefValue};
pub use collection::{Collection, CollectionError, WeakCollection};
pub use model::{Model, ModelError, ModelId, ModelRef};
pub use patch::{Patch, PatchType, SubscriptionId};
pub use schema::{FieldKind, IdStrategy, ModelSchema, SchemaBuilder, SchemaError, SchemaRegistry};
pub use snapshot::{RawCollection, RawModel, RawView, RefKind};
pub use view::{SortMethod, View, ViewOptions};

/// JSON object map used for attribute data throughout the library.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the library.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured model and store errors from the model module
    #[error(transparent)]
    Model(model::ModelError),

    /// Structured container errors from the collection module
    #[error(transparent)]
    Collection(collection::CollectionError),

    /// Structured schema construction errors from the schema module
    #[error(transparent)]
    Schema(schema::SchemaError),

    /// Structured network errors from the jsonapi module
    #[cfg(feature = "jsonapi")]
    #[error(transparent)]
    Network(jsonapi::NetworkError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Serialize(_) => "serialize",
            Error::Model(_) => "model",
            Error::Collection(_) => "collection",
            Error::Schema(_) => "schema",
            #[cfg(feature = "jsonapi")]
            Error::Network(_) => "jsonapi",
        }
    }

    /// Check if this error says a model already belongs to another
    /// collection.
    pub fn is_already_owned(&self) -> bool {
        match self {
            Error::Collection(err) => err.is_already_owned(),
            _ => false,
        }
    }

    /// Check if this error is an identity problem (missing id or type).
    pub fn is_identity_error(&self) -> bool {
        match self {
            Error::Collection(err) => {
                err.is_identifier_missing()
                    || matches!(err, collection::CollectionError::TypeRequired)
            }
            Error::Model(err) => matches!(err, model::ModelError::MissingId { .. }),
            _ => false,
        }
    }

    /// Check if this error is a name collision.
    pub fn is_name_taken(&self) -> bool {
        match self {
            Error::Collection(err) => err.is_name_taken(),
            _ => false,
        }
    }

    /// Check if this error says a wire tag had no registered schema.
    pub fn is_unknown_type(&self) -> bool {
        match self {
            Error::Collection(err) => err.is_unknown_type(),
            _ => false,
        }
    }

    /// Check if this error came from the network layer.
    #[cfg(feature = "jsonapi")]
    pub fn is_network_error(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Check if the server rejected a request, via status or payload.
    #[cfg(feature = "jsonapi")]
    pub fn is_rejection(&self) -> bool {
        match self {
            Error::Network(err) => err.is_rejection(),
            _ => false,
        }
    }
}
