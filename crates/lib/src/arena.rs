//! Identity and metadata store.
//!
//! The arena owns everything a model is: its attribute values, its id and
//! persistence flag, its reference buckets, its collection membership and
//! its subscribers. A [`Model`] handle is just an arena plus a [`ModelKey`];
//! cloning a handle never copies model state, and two handles are the same
//! model exactly when they share arena and key.
//!
//! All slot state lives under a single `RwLock`. Mutation paths apply the
//! whole change while holding the write lock, snapshot the listeners that
//! need to hear about it, and hand back [`PendingPatch`] values that the
//! caller dispatches once every lock is released. That ordering is what
//! lets a listener re-enter the store safely.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::JsonMap;
use crate::bucket::{Bucket, RefEntry, RefValue};
use crate::collection::{Collection, CollectionError, WeakCollection};
use crate::model::{Model, ModelError, ModelId, ModelRef};
use crate::patch::{Patch, PatchListener, PatchType, PendingPatch, SubscriberSet, SubscriptionId};
use crate::schema::ModelSchema;
use crate::snapshot::{RawModel, RawModelMeta, RefDescriptor, RefKind};

/// Opaque handle to one model slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ModelKey(u64);

impl ModelKey {
    #[cfg(test)]
    pub(crate) fn test_key(raw: u64) -> ModelKey {
        ModelKey(raw)
    }
}

struct Slot {
    schema: Arc<ModelSchema>,
    id: ModelId,
    persisted: bool,
    collection: WeakCollection,
    data: JsonMap,
    buckets: BTreeMap<String, Bucket>,
    subscribers: SubscriberSet,
}

impl Slot {
    /// Listeners that hear about changes to this slot: the model's own
    /// subscribers followed by the owning collection's.
    fn listeners(&self) -> Vec<PatchListener> {
        let mut listeners = self.subscribers.snapshot();
        if let Some(collection) = self.collection.upgrade() {
            listeners.extend(collection.listener_snapshot());
        }
        listeners
    }
}

#[derive(Default)]
struct ArenaState {
    next_key: u64,
    slots: HashMap<ModelKey, Slot>,
}

/// Shared identity store backing one or more collections.
///
/// Slots live until they are retired through [`Model::retire`]; dropping
/// the arena releases every remaining model at once.
#[derive(Clone, Default)]
pub struct Arena {
    shared: Arc<RwLock<ArenaState>>,
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("models", &self.read().slots.len())
            .finish()
    }
}

impl Arena {
    /// Creates an empty arena.
    pub fn new() -> Arena {
        Arena::default()
    }

    /// Creates a model from raw attribute data.
    ///
    /// The schema's preprocess hook runs first, then an `"id"` key is
    /// lifted out of the data as the explicit id. Without one, the schema's
    /// id strategy supplies a generated id. Values under declared reference
    /// fields seed the corresponding buckets instead of becoming
    /// attributes.
    ///
    /// The model starts out unowned; add it to a collection to make it
    /// findable and to let its identifier references resolve.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidData`] when `data` is not a JSON
    /// object and [`ModelError::MissingId`] when the schema assigns ids
    /// manually and the data carries none.
    pub fn create(&self, schema: &Arc<ModelSchema>, data: Value) -> crate::Result<Model> {
        let Value::Object(data) = data else {
            return Err(CollectionError::InvalidData.into());
        };
        let (data, explicit) = prepare(schema, data);
        let model = self.create_prepared(schema, data, explicit, false, &BTreeMap::new())?;
        Ok(model)
    }

    /// Creates a model from already-preprocessed parts.
    ///
    /// `extra_refs` carries reference descriptors beyond the schema's,
    /// as recorded in snapshots of untyped models.
    pub(crate) fn create_prepared(
        &self,
        schema: &Arc<ModelSchema>,
        data: JsonMap,
        explicit: Option<ModelId>,
        persisted: bool,
        extra_refs: &BTreeMap<String, RefDescriptor>,
    ) -> Result<Model, ModelError> {
        let id = match explicit.filter(|id| !id.is_empty()).or_else(|| schema.next_id()) {
            Some(id) => id,
            None => {
                return Err(ModelError::MissingId {
                    type_name: schema.type_name().to_owned(),
                });
            }
        };

        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
        for field in schema.fields() {
            if let (Some(kind), Some(target)) = (RefKind::of_field(&field.kind), field.kind.target())
            {
                buckets.insert(field.name.clone(), Bucket::new(kind, target));
            }
        }
        for (field, descriptor) in extra_refs {
            buckets
                .entry(field.clone())
                .or_insert_with(|| Bucket::new(descriptor.kind, descriptor.target.clone()));
        }

        let mut attributes = JsonMap::new();
        for (field, value) in data {
            if let Some(bucket) = buckets.get_mut(&field) {
                bucket.assign_value(&value);
            } else {
                attributes.insert(field, value);
            }
        }
        for field in schema.fields() {
            if let Some(default) = &field.default
                && !attributes.contains_key(&field.name)
                && !buckets.contains_key(&field.name)
            {
                attributes.insert(field.name.clone(), default.clone());
            }
        }

        let mut state = self.write();
        let key = ModelKey(state.next_key);
        state.next_key += 1;
        state.slots.insert(
            key,
            Slot {
                schema: Arc::clone(schema),
                id,
                persisted,
                collection: WeakCollection::empty(),
                data: attributes,
                buckets,
                subscribers: SubscriberSet::default(),
            },
        );
        drop(state);

        Ok(Model::from_parts(self.clone(), key))
    }

    /// Whether two handles point at the same arena.
    pub(crate) fn same(&self, other: &Arena) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn contains(&self, key: ModelKey) -> bool {
        self.read().slots.contains_key(&key)
    }

    /// Builds a model handle when the key is still live.
    pub(crate) fn handle_if_present(&self, key: ModelKey) -> Option<Model> {
        self.contains(key)
            .then(|| Model::from_parts(self.clone(), key))
    }

    /// Drops a slot. Stale keys are ignored.
    ///
    /// Key entries in other models' buckets that pointed at the slot stop
    /// resolving and fall out of identifier projections.
    pub(crate) fn retire(&self, key: ModelKey) -> bool {
        self.write().slots.remove(&key).is_some()
    }

    pub(crate) fn schema_of(&self, key: ModelKey) -> Result<Arc<ModelSchema>, ModelError> {
        self.with_slot(key, |slot| Arc::clone(&slot.schema))
    }

    pub(crate) fn type_of(&self, key: ModelKey) -> Result<String, ModelError> {
        self.with_slot(key, |slot| slot.schema.type_name().to_owned())
    }

    pub(crate) fn id_of(&self, key: ModelKey) -> Result<ModelId, ModelError> {
        self.with_slot(key, |slot| slot.id.clone())
    }

    pub(crate) fn ref_of(&self, key: ModelKey) -> Result<ModelRef, ModelError> {
        self.with_slot(key, |slot| {
            ModelRef::new(slot.schema.type_name(), slot.id.clone())
        })
    }

    pub(crate) fn persisted(&self, key: ModelKey) -> Result<bool, ModelError> {
        self.with_slot(key, |slot| slot.persisted)
    }

    pub(crate) fn set_persisted(&self, key: ModelKey, persisted: bool) -> Result<(), ModelError> {
        self.with_slot_mut(key, |slot| slot.persisted = persisted)
    }

    pub(crate) fn collection_of(&self, key: ModelKey) -> Result<Option<Collection>, ModelError> {
        self.with_slot(key, |slot| slot.collection.upgrade())
    }

    /// Records collection ownership and rebinds every bucket.
    pub(crate) fn bind_collection(
        &self,
        key: ModelKey,
        collection: &Collection,
    ) -> Result<(), ModelError> {
        let weak = collection.downgrade();
        self.with_slot_mut(key, |slot| {
            slot.collection = weak.clone();
            for bucket in slot.buckets.values_mut() {
                bucket.set_collection(weak.clone());
            }
        })
    }

    /// Clears collection ownership and unbinds every bucket.
    pub(crate) fn unbind_collection(&self, key: ModelKey) -> Result<(), ModelError> {
        self.with_slot_mut(key, |slot| {
            slot.collection = WeakCollection::empty();
            for bucket in slot.buckets.values_mut() {
                bucket.set_collection(WeakCollection::empty());
            }
        })
    }

    pub(crate) fn attribute(&self, key: ModelKey, field: &str) -> Result<Option<Value>, ModelError> {
        self.with_slot(key, |slot| slot.data.get(field).cloned())
    }

    pub(crate) fn attributes(&self, key: ModelKey) -> Result<JsonMap, ModelError> {
        self.with_slot(key, |slot| slot.data.clone())
    }

    /// Clones the bucket behind a reference field.
    ///
    /// # Errors
    ///
    /// [`ModelError::NotAReference`] when the field is an attribute, and
    /// [`ModelError::UnknownField`] when the model has no such field.
    pub(crate) fn bucket_of(&self, key: ModelKey, field: &str) -> Result<Bucket, ModelError> {
        self.with_slot(key, |slot| match slot.buckets.get(field) {
            Some(bucket) => Ok(bucket.clone()),
            None => Err(not_a_reference(slot, field)),
        })?
    }

    /// Registers a reference bucket discovered at runtime, bound to the
    /// slot's current collection. Existing buckets are left alone.
    pub(crate) fn init_runtime_ref(
        &self,
        key: ModelKey,
        field: &str,
        kind: RefKind,
        target: &str,
    ) -> Result<(), ModelError> {
        self.with_slot_mut(key, |slot| {
            if !slot.buckets.contains_key(field) {
                let mut bucket = Bucket::new(kind, target);
                bucket.set_collection(slot.collection.clone());
                slot.buckets.insert(field.to_owned(), bucket);
            }
        })
    }

    /// Sets one field, routing to its bucket when the field is a reference.
    ///
    /// Returns the patches to dispatch; empty when the value did not
    /// actually change.
    pub(crate) fn set_value(
        &self,
        key: ModelKey,
        field: &str,
        value: Value,
    ) -> Result<Vec<PendingPatch>, ModelError> {
        self.apply_update(key, std::iter::once((field.to_owned(), value)))
    }

    /// Applies several field changes as one logical mutation with one patch.
    pub(crate) fn update(
        &self,
        key: ModelKey,
        changes: JsonMap,
    ) -> Result<Vec<PendingPatch>, ModelError> {
        self.apply_update(key, changes.into_iter())
    }

    fn apply_update(
        &self,
        key: ModelKey,
        changes: impl Iterator<Item = (String, Value)>,
    ) -> Result<Vec<PendingPatch>, ModelError> {
        let mut state = self.write();
        let slot = state.slots.get_mut(&key).ok_or(ModelError::Retired)?;

        let mut old_fields = JsonMap::new();
        let mut new_fields = JsonMap::new();
        // Bucket contents are projected to identifier form outside the lock.
        let mut bucket_changes: Vec<(String, Bucket, Bucket)> = Vec::new();

        for (field, value) in changes {
            if let Some(bucket) = slot.buckets.get_mut(&field) {
                let before = bucket.clone();
                bucket.assign_value(&value);
                bucket_changes.push((field, before, bucket.clone()));
            } else {
                let previous = slot.data.get(&field).cloned();
                if previous.as_ref() == Some(&value) {
                    continue;
                }
                if let Some(previous) = previous {
                    old_fields.insert(field.clone(), previous);
                }
                new_fields.insert(field.clone(), value.clone());
                slot.data.insert(field, value);
            }
        }

        let header = (slot.schema.type_name().to_owned(), slot.id.clone());
        let listeners = slot.listeners();
        drop(state);

        for (field, before, after) in bucket_changes {
            let old = before.ref_value(self);
            let new = after.ref_value(self);
            if old == new {
                continue;
            }
            old_fields.insert(field.clone(), serde_json::to_value(old).unwrap_or_default());
            new_fields.insert(field, serde_json::to_value(new).unwrap_or_default());
        }

        if new_fields.is_empty() && old_fields.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![PendingPatch {
            patch: Patch {
                patch_type: PatchType::Update,
                model_type: header.0,
                model_id: header.1,
                old_value: Some(old_fields),
                new_value: Some(new_fields),
            },
            listeners,
        }])
    }

    /// Assigns the single-valued side of a reference field.
    pub(crate) fn set_ref_one(
        &self,
        key: ModelKey,
        field: &str,
        entry: Option<RefEntry>,
    ) -> Result<Vec<PendingPatch>, ModelError> {
        self.apply_ref(key, field, |bucket| bucket.assign_one(entry, field))
    }

    /// Assigns the list-valued side of a reference field.
    pub(crate) fn set_ref_many(
        &self,
        key: ModelKey,
        field: &str,
        entries: Vec<RefEntry>,
    ) -> Result<Vec<PendingPatch>, ModelError> {
        self.apply_ref(key, field, |bucket| bucket.assign_many(entries, field))
    }

    fn apply_ref(
        &self,
        key: ModelKey,
        field: &str,
        assign: impl FnOnce(&mut Bucket) -> Result<(), ModelError>,
    ) -> Result<Vec<PendingPatch>, ModelError> {
        let mut state = self.write();
        let slot = state.slots.get_mut(&key).ok_or(ModelError::Retired)?;
        let Some(bucket) = slot.buckets.get_mut(field) else {
            return Err(not_a_reference(slot, field));
        };

        let before = bucket.clone();
        assign(bucket)?;
        let after = bucket.clone();
        let header = (slot.schema.type_name().to_owned(), slot.id.clone());
        let listeners = slot.listeners();
        drop(state);

        let old = before.ref_value(self);
        let new = after.ref_value(self);
        if old == new {
            return Ok(Vec::new());
        }
        Ok(vec![PendingPatch {
            patch: Patch {
                patch_type: PatchType::Update,
                model_type: header.0,
                model_id: header.1,
                old_value: Some(field_map(field, &old)),
                new_value: Some(field_map(field, &new)),
            },
            listeners,
        }])
    }

    /// Drops every reference the given members hold to the removed models.
    ///
    /// `extra_listeners` are the removing collection's subscribers; they
    /// hear about the resulting updates alongside each member's own
    /// subscribers. Returns one update patch per member that changed.
    pub(crate) fn scrub_references(
        &self,
        members: &[ModelKey],
        removed: &[(ModelKey, ModelRef)],
        extra_listeners: &[PatchListener],
    ) -> Vec<PendingPatch> {
        struct Scrubbed {
            header: (String, ModelId),
            listeners: Vec<PatchListener>,
            fields: Vec<(String, Bucket, Bucket)>,
        }

        let mut state = self.write();
        let mut scrubbed = Vec::new();
        for member in members {
            let Some(slot) = state.slots.get_mut(member) else {
                continue;
            };
            let mut fields = Vec::new();
            for (field, bucket) in slot.buckets.iter_mut() {
                let before = bucket.clone();
                let mut changed = false;
                for (key, target) in removed {
                    changed |= bucket.scrub(*key, target);
                }
                if changed {
                    fields.push((field.clone(), before, bucket.clone()));
                }
            }
            if !fields.is_empty() {
                let mut listeners = slot.subscribers.snapshot();
                listeners.extend(extra_listeners.iter().cloned());
                scrubbed.push(Scrubbed {
                    header: (slot.schema.type_name().to_owned(), slot.id.clone()),
                    listeners,
                    fields,
                });
            }
        }
        drop(state);

        let mut pendings = Vec::new();
        for entry in scrubbed {
            let mut old_fields = JsonMap::new();
            let mut new_fields = JsonMap::new();
            for (field, before, after) in entry.fields {
                old_fields.insert(
                    field.clone(),
                    serde_json::to_value(before.ref_value(self)).unwrap_or_default(),
                );
                new_fields.insert(
                    field,
                    serde_json::to_value(after.ref_value(self)).unwrap_or_default(),
                );
            }
            pendings.push(PendingPatch {
                patch: Patch {
                    patch_type: PatchType::Update,
                    model_type: entry.header.0,
                    model_id: entry.header.1,
                    old_value: Some(old_fields),
                    new_value: Some(new_fields),
                },
                listeners: entry.listeners,
            });
        }
        pendings
    }

    /// Replaces a model's id and rewrites identifier references to it held
    /// by the given members. Used when the backend assigns the real id.
    pub(crate) fn adopt_id(
        &self,
        key: ModelKey,
        new_id: ModelId,
        members: &[ModelKey],
    ) -> Result<ModelId, ModelError> {
        let mut state = self.write();
        let slot = state.slots.get_mut(&key).ok_or(ModelError::Retired)?;
        let old_ref = ModelRef::new(slot.schema.type_name(), slot.id.clone());
        let new_ref = ModelRef::new(slot.schema.type_name(), new_id.clone());
        let old_id = std::mem::replace(&mut slot.id, new_id);

        for member in members {
            if let Some(slot) = state.slots.get_mut(member) {
                for bucket in slot.buckets.values_mut() {
                    bucket.rewrite_ref(&old_ref, &new_ref);
                }
            }
        }
        Ok(old_id)
    }

    pub(crate) fn subscribe(
        &self,
        key: ModelKey,
        listener: PatchListener,
    ) -> Result<SubscriptionId, ModelError> {
        self.with_slot_mut(key, |slot| slot.subscribers.insert(listener))
    }

    pub(crate) fn unsubscribe(&self, key: ModelKey, id: SubscriptionId) -> Result<bool, ModelError> {
        self.with_slot_mut(key, |slot| slot.subscribers.remove(id))
    }

    /// Snapshot of the slot's listeners plus its collection's, for patches
    /// built outside the usual mutation paths.
    pub(crate) fn listeners_of(&self, key: ModelKey) -> Result<Vec<PatchListener>, ModelError> {
        self.with_slot(key, Slot::listeners)
    }

    /// Serializes one model: attributes, references in identifier form and
    /// the `__meta__` block.
    pub(crate) fn to_raw(&self, key: ModelKey) -> Result<RawModel, ModelError> {
        let (schema, id, persisted, data, buckets) = self.with_slot(key, |slot| {
            (
                Arc::clone(&slot.schema),
                slot.id.clone(),
                slot.persisted,
                slot.data.clone(),
                slot.buckets.clone(),
            )
        })?;

        let mut refs = BTreeMap::new();
        let mut fields = data;
        for (field, bucket) in &buckets {
            refs.insert(
                field.clone(),
                RefDescriptor {
                    target: bucket.target().to_owned(),
                    kind: bucket.kind(),
                },
            );
            fields.insert(
                field.clone(),
                serde_json::to_value(bucket.ref_value(self)).unwrap_or_default(),
            );
        }

        Ok(RawModel {
            meta: RawModelMeta {
                type_name: schema.type_name().to_owned(),
                id,
                persisted,
                refs,
            },
            fields,
        })
    }

    /// Projects every reference field to identifier form, keyed by field
    /// name.
    pub(crate) fn ref_values(
        &self,
        key: ModelKey,
    ) -> Result<BTreeMap<String, RefValue>, ModelError> {
        let buckets = self.with_slot(key, |slot| slot.buckets.clone())?;
        Ok(buckets
            .into_iter()
            .map(|(field, bucket)| {
                let value = bucket.ref_value(self);
                (field, value)
            })
            .collect())
    }

    fn read(&self) -> RwLockReadGuard<'_, ArenaState> {
        self.shared.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, ArenaState> {
        self.shared.write().unwrap()
    }

    fn with_slot<R>(&self, key: ModelKey, f: impl FnOnce(&Slot) -> R) -> Result<R, ModelError> {
        let state = self.read();
        state.slots.get(&key).map(f).ok_or(ModelError::Retired)
    }

    fn with_slot_mut<R>(
        &self,
        key: ModelKey,
        f: impl FnOnce(&mut Slot) -> R,
    ) -> Result<R, ModelError> {
        let mut state = self.write();
        state.slots.get_mut(&key).map(f).ok_or(ModelError::Retired)
    }
}

/// Runs the preprocess hook and lifts the explicit id out of raw data.
pub(crate) fn prepare(schema: &Arc<ModelSchema>, mut data: JsonMap) -> (JsonMap, Option<ModelId>) {
    schema.run_preprocess(&mut data);
    let explicit = data.remove("id").and_then(|id| parse_id(&id));
    (data, explicit)
}

/// Reads an id out of a raw JSON value, accepting strings and numbers.
pub(crate) fn parse_id(value: &Value) -> Option<ModelId> {
    match value {
        Value::String(s) => Some(ModelId::from(s.as_str())),
        Value::Number(n) => Some(ModelId::from(n.to_string())),
        _ => None,
    }
}

fn not_a_reference(slot: &Slot, field: &str) -> ModelError {
    let type_name = slot.schema.type_name().to_owned();
    let declared_attribute = slot
        .schema
        .field(field)
        .is_some_and(|f| !f.kind.is_reference());
    if declared_attribute || slot.data.contains_key(field) {
        ModelError::NotAReference {
            type_name,
            field: field.to_owned(),
        }
    } else {
        ModelError::UnknownField {
            type_name,
            field: field.to_owned(),
        }
    }
}

fn field_map(field: &str, value: &crate::bucket::RefValue) -> JsonMap {
    let mut map = JsonMap::new();
    map.insert(
        field.to_owned(),
        serde_json::to_value(value).unwrap_or_default(),
    );
    map
}
