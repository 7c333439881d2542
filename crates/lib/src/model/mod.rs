//! Models.
//!
//! A [`Model`] is a cheap-to-clone handle onto one slot of an [`Arena`]:
//! clones share all state, equality means "the same model", and every read
//! or write goes through the arena so that observers and collection indices
//! stay consistent. Models carry no public fields; attribute access is by
//! name and reference access goes through the typed `one`/`many` accessors.

mod errors;
mod id;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::Value;

pub use errors::ModelError;
pub use id::{ModelId, ModelRef};

use crate::JsonMap;
use crate::arena::{Arena, ModelKey};
use crate::bucket::{RefInput, RefValue};
use crate::collection::{Collection, CollectionError};
use crate::patch::{Patch, SubscriptionId, dispatch_all};
use crate::schema::ModelSchema;
use crate::snapshot::RawModel;

/// Handle onto one model.
///
/// Obtained from [`Arena::create`] or from collection constructors and
/// lookups. Two handles compare equal exactly when they address the same
/// slot of the same arena:
///
/// ```
/// use engram::{Arena, ModelSchema};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let arena = Arena::new();
/// let schema = Arc::new(ModelSchema::builder("articles").attribute("title").build()?);
/// let article = arena.create(&schema, json!({"title": "Hello"}))?;
///
/// assert_eq!(article.get("title")?, Some(json!("Hello")));
/// article.set("title", json!("Updated"))?;
/// assert_eq!(article.clone(), article);
/// # Ok::<(), engram::Error>(())
/// ```
#[derive(Clone)]
pub struct Model {
    arena: Arena,
    key: ModelKey,
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.arena.same(&other.arena)
    }
}

impl Eq for Model {}

impl Hash for Model {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Model");
        match self.arena.ref_of(self.key) {
            Ok(r) => s.field("type", &r.type_name).field("id", &r.id),
            Err(_) => s.field("key", &self.key),
        }
        .finish()
    }
}

impl Model {
    pub(crate) fn from_parts(arena: Arena, key: ModelKey) -> Model {
        Model { arena, key }
    }

    pub(crate) fn key(&self) -> ModelKey {
        self.key
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Current id of the model.
    pub fn id(&self) -> crate::Result<ModelId> {
        Ok(self.arena.id_of(self.key)?)
    }

    /// Wire tag of the model's type.
    pub fn type_name(&self) -> crate::Result<String> {
        Ok(self.arena.type_of(self.key)?)
    }

    /// Identifier pair addressing this model.
    pub fn to_ref(&self) -> crate::Result<ModelRef> {
        Ok(self.arena.ref_of(self.key)?)
    }

    /// Schema the model was created with.
    pub fn schema(&self) -> crate::Result<Arc<ModelSchema>> {
        Ok(self.arena.schema_of(self.key)?)
    }

    /// Whether the backend has persisted this model.
    pub fn is_persisted(&self) -> crate::Result<bool> {
        Ok(self.arena.persisted(self.key)?)
    }

    /// Collection the model currently belongs to, if any.
    pub fn collection(&self) -> crate::Result<Option<Collection>> {
        Ok(self.arena.collection_of(self.key)?)
    }

    /// Reads one attribute. `None` when the attribute was never set.
    ///
    /// Reference fields are not attributes; read them through
    /// [`Self::one`], [`Self::many`] or [`Self::ref_value`].
    pub fn get(&self, field: &str) -> crate::Result<Option<Value>> {
        Ok(self.arena.attribute(self.key, field)?)
    }

    /// Clones the full attribute map.
    pub fn attributes(&self) -> crate::Result<JsonMap> {
        Ok(self.arena.attributes(self.key)?)
    }

    /// Sets one field and notifies subscribers with a single update patch.
    ///
    /// Undeclared fields are accepted and stored as plain attributes.
    /// Writing to a declared reference field routes through its bucket:
    /// the value is read as `null`, an identifier object, a scalar id, or
    /// an array of those.
    pub fn set(&self, field: &str, value: Value) -> crate::Result<()> {
        let pendings = self.arena.set_value(self.key, field, value)?;
        dispatch_all(pendings);
        Ok(())
    }

    /// Applies several field changes as one logical mutation.
    ///
    /// Subscribers see exactly one update patch carrying every field that
    /// actually changed.
    pub fn update(&self, changes: Value) -> crate::Result<()> {
        let Value::Object(changes) = changes else {
            return Err(CollectionError::InvalidData.into());
        };
        let pendings = self.arena.update(self.key, changes)?;
        dispatch_all(pendings);
        Ok(())
    }

    /// Resolves a single-valued reference to a live model.
    ///
    /// Yields `None` while the target is absent from the bound collection;
    /// resolution never inserts anything.
    ///
    /// # Errors
    ///
    /// [`ModelError::CardinalityMismatch`] when the field currently holds
    /// a list, [`ModelError::UnknownField`] / [`ModelError::NotAReference`]
    /// when the field is not a reference.
    pub fn one(&self, field: &str) -> crate::Result<Option<Model>> {
        let bucket = self.arena.bucket_of(self.key, field)?;
        Ok(bucket.resolve_one(&self.arena, field)?)
    }

    /// Resolves a list-valued reference to live models, skipping entries
    /// that do not resolve yet.
    pub fn many(&self, field: &str) -> crate::Result<Vec<Model>> {
        let bucket = self.arena.bucket_of(self.key, field)?;
        Ok(bucket.resolve_many(&self.arena, field)?)
    }

    /// Assigns the single-valued side of a reference field.
    ///
    /// On a `ToOneOrMany` field this reinterprets the reference as
    /// single-valued regardless of its previous shape.
    pub fn set_one(&self, field: &str, value: Option<RefInput>) -> crate::Result<()> {
        let entry = value.map(|input| input.into_entry(&self.arena)).transpose()?;
        let pendings = self.arena.set_ref_one(self.key, field, entry)?;
        dispatch_all(pendings);
        Ok(())
    }

    /// Assigns the list-valued side of a reference field.
    ///
    /// On a `ToOneOrMany` field this reinterprets the reference as
    /// list-valued regardless of its previous shape.
    pub fn set_many(&self, field: &str, values: Vec<RefInput>) -> crate::Result<()> {
        let entries = values
            .into_iter()
            .map(|input| input.into_entry(&self.arena))
            .collect::<crate::Result<Vec<_>>>()?;
        let pendings = self.arena.set_ref_many(self.key, field, entries)?;
        dispatch_all(pendings);
        Ok(())
    }

    /// Projects a reference field to identifier form without resolving it.
    pub fn ref_value(&self, field: &str) -> crate::Result<RefValue> {
        let bucket = self.arena.bucket_of(self.key, field)?;
        Ok(bucket.ref_value(&self.arena))
    }

    /// Registers a listener for patches affecting this model.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Patch) + Send + Sync + 'static,
    ) -> crate::Result<SubscriptionId> {
        Ok(self.arena.subscribe(self.key, Arc::new(listener))?)
    }

    /// Removes a listener; `true` when the handle was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> crate::Result<bool> {
        Ok(self.arena.unsubscribe(self.key, id)?)
    }

    /// Frees the model's slot in its arena.
    ///
    /// A model still owned by a collection is removed from it first, with
    /// the usual Remove patch and reference scrubbing. Afterwards every
    /// surviving handle to the slot reports [`ModelError::Retired`] and
    /// buckets that pointed at it resolve to nothing. Retiring an already
    /// retired model is a no-op.
    pub fn retire(self) -> crate::Result<()> {
        match self.arena.collection_of(self.key) {
            Ok(Some(collection)) => collection.remove_model(&self)?,
            Ok(None) => {}
            Err(ModelError::Retired) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        self.arena.retire(self.key);
        Ok(())
    }

    /// Serializes the model to its snapshot form.
    pub fn to_raw(&self) -> crate::Result<RawModel> {
        Ok(self.arena.to_raw(self.key)?)
    }
}
