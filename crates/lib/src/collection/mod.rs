//! Collections.
//!
//! A [`Collection`] owns a set of models with unique `(type, id)` identity
//! and keeps three indices consistent under one lock: insertion order, the
//! per-type member lists, and the id lookup map. Structural validation
//! happens before any index is written, so a failed operation never leaves
//! partial state behind.
//!
//! Removing a model detaches it and then scrubs every remaining member's
//! reference buckets, so no bucket in the collection keeps pointing at a
//! model that is gone. Subscribers hear about each mutation as exactly one
//! [`Patch`](crate::Patch) per affected model, delivered after all locks
//! are released.
//!
//! A `Collection` is a cheap clone over shared state and [`WeakCollection`]
//! is its non-owning counterpart, used for model back-references so that
//! dropping the last real handle drops the collection.

mod errors;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::Value;
use tracing::debug;

pub use errors::CollectionError;

use crate::JsonMap;
use crate::arena::{Arena, ModelKey, parse_id, prepare};
use crate::model::{Model, ModelId, ModelRef};
use crate::patch::{
    Patch, PatchListener, PatchType, PendingPatch, SubscriberSet, SubscriptionId, dispatch_all,
};
use crate::schema::{ModelSchema, SchemaRegistry};
use crate::snapshot::{META_KEY, RawCollection, RawModel, RefDescriptor};
use crate::view::{View, ViewOptions, ViewState};

#[derive(Default)]
struct CollectionState {
    /// Members in insertion order.
    order: Vec<ModelKey>,
    /// Fast membership checks.
    members: HashSet<ModelKey>,
    /// Members per wire tag, in insertion order.
    by_type: HashMap<String, Vec<ModelKey>>,
    /// `(type, id)` identity index.
    ids: HashMap<String, HashMap<ModelId, ModelKey>>,
    /// Named views over the members.
    views: BTreeMap<String, ViewState>,
}

struct CollectionShared {
    arena: Arena,
    registry: SchemaRegistry,
    state: RwLock<CollectionState>,
    subscribers: Mutex<SubscriberSet>,
}

/// Observable, identity-checked set of models.
#[derive(Clone)]
pub struct Collection {
    shared: Arc<CollectionShared>,
}

/// Non-owning handle to a [`Collection`].
#[derive(Clone, Default)]
pub struct WeakCollection {
    shared: Weak<CollectionShared>,
}

impl WeakCollection {
    /// A handle that upgrades to nothing, for the unowned state.
    pub(crate) fn empty() -> WeakCollection {
        WeakCollection::default()
    }

    /// Attempts to recover the collection.
    pub fn upgrade(&self) -> Option<Collection> {
        self.shared.upgrade().map(|shared| Collection { shared })
    }
}

impl fmt::Debug for WeakCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCollection")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Collection {}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read().unwrap();
        f.debug_struct("Collection")
            .field("models", &state.order.len())
            .field("views", &state.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Collection {
    /// Creates an empty collection with its own arena.
    pub fn new(registry: SchemaRegistry) -> Collection {
        Collection::with_arena(Arena::new(), registry)
    }

    /// Creates an empty collection over an existing arena, so models can
    /// be moved between collections that share it.
    pub fn with_arena(arena: Arena, registry: SchemaRegistry) -> Collection {
        Collection {
            shared: Arc::new(CollectionShared {
                arena,
                registry,
                state: RwLock::new(CollectionState::default()),
                subscribers: Mutex::new(SubscriberSet::default()),
            }),
        }
    }

    /// Rebuilds a collection from its serialized form.
    ///
    /// Models are hydrated first, then views with their stored membership
    /// and order. Together with [`Self::to_raw`] this satisfies the
    /// round-trip law: identities, field values and view contents survive.
    pub fn from_raw(registry: SchemaRegistry, raw: RawCollection) -> crate::Result<Collection> {
        let collection = Collection::new(registry);
        for model in raw.models {
            collection.add_snapshot(model)?;
        }
        let mut state = collection.shared.state.write().unwrap();
        for (name, view) in raw.views {
            state.views.insert(name, ViewState::from_raw(view));
        }
        drop(state);
        Ok(collection)
    }

    /// The arena backing this collection.
    pub fn arena(&self) -> &Arena {
        &self.shared.arena
    }

    /// The schema registry used for raw construction.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.shared.registry
    }

    /// Creates a non-owning handle.
    pub fn downgrade(&self) -> WeakCollection {
        WeakCollection {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Whether two handles refer to the same collection.
    pub(crate) fn same(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Number of models in the collection.
    pub fn len(&self) -> usize {
        self.shared.state.read().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a listener for every patch affecting this collection's
    /// models, including updates to individual members.
    pub fn subscribe(&self, listener: impl Fn(&Patch) + Send + Sync + 'static) -> SubscriptionId {
        self.shared
            .subscribers
            .lock()
            .unwrap()
            .insert(Arc::new(listener))
    }

    /// Removes a listener; `true` when the handle was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.lock().unwrap().remove(id)
    }

    pub(crate) fn listener_snapshot(&self) -> Vec<PatchListener> {
        self.shared.subscribers.lock().unwrap().snapshot()
    }

    /// Whether the model is currently a member of this collection.
    pub fn has_item(&self, model: &Model) -> bool {
        model.arena().same(&self.shared.arena)
            && self
                .shared
                .state
                .read()
                .unwrap()
                .members
                .contains(&model.key())
    }

    /// Looks up a model by type and id. Lookup misses are `None`, never
    /// errors.
    pub fn find_one(&self, type_name: &str, id: impl Into<ModelId>) -> Option<Model> {
        let id = id.into();
        let state = self.shared.state.read().unwrap();
        let key = *state.ids.get(type_name)?.get(&id)?;
        drop(state);
        Some(self.model(key))
    }

    /// Looks up a model by identifier pair.
    pub fn find_ref(&self, r: &ModelRef) -> Option<Model> {
        self.find_one(&r.type_name, r.id.clone())
    }

    /// First model matching the predicate, in insertion order.
    pub fn find(&self, predicate: impl Fn(&Model) -> bool) -> Option<Model> {
        self.keys_snapshot()
            .into_iter()
            .map(|key| self.model(key))
            .find(|model| predicate(model))
    }

    /// All models matching the predicate, in insertion order.
    pub fn filter(&self, predicate: impl Fn(&Model) -> bool) -> Vec<Model> {
        self.keys_snapshot()
            .into_iter()
            .map(|key| self.model(key))
            .filter(|model| predicate(model))
            .collect()
    }

    /// All models of one type, in insertion order.
    ///
    /// The returned list is a point-in-time copy; observe the collection
    /// through [`Self::subscribe`] to follow later changes.
    pub fn find_all(&self, type_name: &str) -> Vec<Model> {
        let state = self.shared.state.read().unwrap();
        let keys = state.by_type.get(type_name).cloned().unwrap_or_default();
        drop(state);
        keys.into_iter().map(|key| self.model(key)).collect()
    }

    /// Every model in the collection, in insertion order.
    pub fn all_models(&self) -> Vec<Model> {
        self.keys_snapshot()
            .into_iter()
            .map(|key| self.model(key))
            .collect()
    }

    /// Adds an existing model to the collection.
    ///
    /// Adding a member again is a no-op. If another model with the same
    /// identity is already a member, that model is updated in place from
    /// this one's snapshot and the passed model stays unowned; identities
    /// are never duplicated.
    ///
    /// # Errors
    ///
    /// [`CollectionError::AlreadyOwned`] when the model belongs to a
    /// different collection, [`CollectionError::ForeignArena`] when it was
    /// created in a different arena, and
    /// [`CollectionError::IdentifierMissing`] for an empty id.
    pub fn add(&self, model: &Model) -> crate::Result<()> {
        if !model.arena().same(&self.shared.arena) {
            return Err(CollectionError::ForeignArena.into());
        }
        let arena = &self.shared.arena;
        if let Some(owner) = arena.collection_of(model.key())? {
            if owner.same(self) {
                return Ok(());
            }
            let r = arena.ref_of(model.key())?;
            return Err(CollectionError::AlreadyOwned {
                type_name: r.type_name,
                id: r.id,
            }
            .into());
        }

        let r = arena.ref_of(model.key())?;
        if r.id.is_empty() {
            return Err(CollectionError::IdentifierMissing.into());
        }
        if let Some(existing) = self.find_ref(&r) {
            if existing == *model {
                return Ok(());
            }
            let raw = arena.to_raw(model.key())?;
            existing.update(Value::Object(raw.fields))?;
            return Ok(());
        }
        self.attach(model, r)
    }

    /// Builds a model of a registered type from raw data and adds it.
    ///
    /// Data may carry an `"id"` key and a `"__meta__"` block; values under
    /// declared reference fields seed the model's buckets. When a member
    /// with the same identity already exists it is updated in place and
    /// returned, leaving the collection's length unchanged.
    ///
    /// # Errors
    ///
    /// [`CollectionError::UnknownType`] when no schema is registered for
    /// `type_name` and [`CollectionError::InvalidData`] when `data` is not
    /// a JSON object.
    pub fn add_raw(&self, type_name: &str, data: Value) -> crate::Result<Model> {
        let schema = self
            .shared
            .registry
            .schema(type_name)
            .ok_or_else(|| CollectionError::UnknownType {
                type_name: type_name.to_owned(),
            })?;
        let Value::Object(mut map) = data else {
            return Err(CollectionError::InvalidData.into());
        };

        let meta = match map.remove(META_KEY) {
            Some(meta) => serde_json::from_value::<PartialMeta>(meta)
                .map_err(|_| CollectionError::InvalidData)?,
            None => PartialMeta::default(),
        };
        let (data, explicit) = prepare(&schema, map);
        let explicit = explicit.or(meta.id);
        self.add_prepared(&schema, data, explicit, meta.persisted, &meta.refs)
    }

    /// [`Self::add_raw`] over a batch.
    pub fn add_raw_many(&self, type_name: &str, values: Vec<Value>) -> crate::Result<Vec<Model>> {
        values
            .into_iter()
            .map(|value| self.add_raw(type_name, value))
            .collect()
    }

    /// Hydrates serialized models, merging by identity.
    ///
    /// Every value must carry a `__meta__` block naming its type and id.
    /// Existing members with the same identity are updated in place, never
    /// replaced.
    ///
    /// # Errors
    ///
    /// [`CollectionError::TypeRequired`] when type information is missing,
    /// [`CollectionError::IdentifierMissing`] when the id is, and
    /// [`CollectionError::UnknownType`] when the type has no registered
    /// schema.
    pub fn insert(&self, raws: Vec<Value>) -> crate::Result<Vec<Model>> {
        raws.into_iter().map(|raw| self.insert_one(raw)).collect()
    }

    fn insert_one(&self, raw: Value) -> crate::Result<Model> {
        let Value::Object(mut map) = raw else {
            return Err(CollectionError::InvalidData.into());
        };
        let Some(Value::Object(meta)) = map.remove(META_KEY) else {
            return Err(CollectionError::TypeRequired.into());
        };
        let type_name = match meta.get("type").and_then(Value::as_str) {
            Some(type_name) if !type_name.is_empty() => type_name.to_owned(),
            _ => return Err(CollectionError::TypeRequired.into()),
        };
        let id = match meta.get("id").and_then(parse_id) {
            Some(id) if !id.is_empty() => id,
            _ => return Err(CollectionError::IdentifierMissing.into()),
        };
        let persisted = meta
            .get("persisted")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let refs = meta
            .get("refs")
            .and_then(|refs| {
                serde_json::from_value::<BTreeMap<String, RefDescriptor>>(refs.clone()).ok()
            })
            .unwrap_or_default();

        let schema = self
            .shared
            .registry
            .schema(&type_name)
            .ok_or(CollectionError::UnknownType { type_name })?;
        let (data, explicit) = prepare(&schema, map);
        self.add_prepared(&schema, data, explicit.or(Some(id)), persisted, &refs)
    }

    /// Hydrates one typed snapshot, as produced by [`Model::to_raw`].
    pub fn add_snapshot(&self, raw: RawModel) -> crate::Result<Model> {
        let schema = self
            .shared
            .registry
            .schema(&raw.meta.type_name)
            .ok_or(CollectionError::UnknownType {
                type_name: raw.meta.type_name.clone(),
            })?;
        let (data, explicit) = prepare(&schema, raw.fields);
        self.add_prepared(
            &schema,
            data,
            explicit.or(Some(raw.meta.id)),
            raw.meta.persisted,
            &raw.meta.refs,
        )
    }

    fn add_prepared(
        &self,
        schema: &Arc<ModelSchema>,
        data: JsonMap,
        explicit: Option<ModelId>,
        persisted: bool,
        extra_refs: &BTreeMap<String, RefDescriptor>,
    ) -> crate::Result<Model> {
        let arena = &self.shared.arena;
        if let Some(id) = explicit.as_ref().filter(|id| !id.is_empty())
            && let Some(existing) = self.find_one(schema.type_name(), id.clone())
        {
            existing.update(Value::Object(data))?;
            if persisted {
                arena.set_persisted(existing.key(), true)?;
            }
            return Ok(existing);
        }

        let model = arena.create_prepared(schema, data, explicit, persisted, extra_refs)?;
        let r = arena.ref_of(model.key())?;
        self.attach(&model, r)?;
        Ok(model)
    }

    /// Inserts a fresh member: indices, ownership backref, create patch.
    fn attach(&self, model: &Model, r: ModelRef) -> crate::Result<()> {
        let key = model.key();
        let mut state = self.shared.state.write().unwrap();
        state.order.push(key);
        state.members.insert(key);
        state.by_type.entry(r.type_name.clone()).or_default().push(key);
        state
            .ids
            .entry(r.type_name.clone())
            .or_default()
            .insert(r.id.clone(), key);
        drop(state);

        let arena = &self.shared.arena;
        arena.bind_collection(key, self)?;
        debug!(model = %r, "Model added to collection");

        let raw = arena.to_raw(key)?;
        dispatch_all(vec![PendingPatch {
            patch: Patch {
                patch_type: PatchType::Create,
                model_type: r.type_name,
                model_id: r.id,
                old_value: None,
                new_value: Some(raw_map(&raw)),
            },
            listeners: arena.listeners_of(key)?,
        }]);
        Ok(())
    }

    /// Removes a model by identity. Removing an absent identity is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IdentifierMissing`] for an empty id.
    pub fn remove(&self, type_name: &str, id: impl Into<ModelId>) -> crate::Result<()> {
        let id = id.into();
        if id.is_empty() {
            return Err(CollectionError::IdentifierMissing.into());
        }
        let state = self.shared.state.read().unwrap();
        let key = state.ids.get(type_name).and_then(|ids| ids.get(&id)).copied();
        drop(state);
        match key {
            Some(key) => self.remove_keys(vec![key]),
            None => Ok(()),
        }
    }

    /// Removes a model. Removing a non-member is a no-op.
    pub fn remove_model(&self, model: &Model) -> crate::Result<()> {
        if !self.has_item(model) {
            return Ok(());
        }
        self.remove_keys(vec![model.key()])
    }

    /// Removes every model of one type.
    pub fn remove_all(&self, type_name: &str) -> crate::Result<()> {
        let state = self.shared.state.read().unwrap();
        let keys = state.by_type.get(type_name).cloned().unwrap_or_default();
        drop(state);
        self.remove_keys(keys)
    }

    /// Removes every model. Views survive with emptied membership.
    pub fn reset(&self) -> crate::Result<()> {
        let keys = self.keys_snapshot();
        self.remove_keys(keys)
    }

    fn remove_keys(&self, keys: Vec<ModelKey>) -> crate::Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let arena = &self.shared.arena;

        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            removed.push((key, arena.ref_of(key)?, arena.to_raw(key)?));
        }

        let removed_keys: HashSet<ModelKey> = removed.iter().map(|(key, ..)| *key).collect();
        let mut removed_ids: HashMap<&str, HashSet<&ModelId>> = HashMap::new();
        for (_, r, _) in &removed {
            removed_ids.entry(&r.type_name).or_default().insert(&r.id);
        }

        let mut state = self.shared.state.write().unwrap();
        state.order.retain(|key| !removed_keys.contains(key));
        for key in &removed_keys {
            state.members.remove(key);
        }
        for (_, r, _) in &removed {
            if let Some(keys) = state.by_type.get_mut(&r.type_name) {
                keys.retain(|key| !removed_keys.contains(key));
            }
            if let Some(ids) = state.ids.get_mut(&r.type_name) {
                ids.remove(&r.id);
            }
        }
        for view in state.views.values_mut() {
            if let Some(gone) = removed_ids.get(view.model_type.as_str()) {
                view.refs.retain(|id| !gone.contains(id));
            }
        }
        let members = state.order.clone();
        drop(state);

        for (key, ..) in &removed {
            arena.unbind_collection(*key)?;
        }

        let collection_listeners = self.listener_snapshot();
        let removed_pairs: Vec<(ModelKey, ModelRef)> = removed
            .iter()
            .map(|(key, r, _)| (*key, r.clone()))
            .collect();
        let scrubbed = arena.scrub_references(&members, &removed_pairs, &collection_listeners);

        debug!(
            removed = removed.len(),
            scrubbed = scrubbed.len(),
            "Models removed from collection"
        );

        let mut pendings = Vec::with_capacity(removed.len() + scrubbed.len());
        for (key, r, raw) in removed {
            let mut listeners = arena.listeners_of(key)?;
            listeners.extend(collection_listeners.iter().cloned());
            pendings.push(PendingPatch {
                patch: Patch {
                    patch_type: PatchType::Remove,
                    model_type: r.type_name,
                    model_id: r.id,
                    old_value: Some(raw_map(&raw)),
                    new_value: None,
                },
                listeners,
            });
        }
        pendings.extend(scrubbed);
        dispatch_all(pendings);
        Ok(())
    }

    /// Upserts one wire resource: a matching identity updates in place,
    /// anything else is constructed (through the generic schema when the
    /// type is unregistered) and marked persisted.
    #[cfg(feature = "jsonapi")]
    pub(crate) fn upsert_wire(
        &self,
        type_name: &str,
        id: Option<ModelId>,
        attributes: JsonMap,
    ) -> crate::Result<Model> {
        let schema = self.shared.registry.ensure(type_name);
        let (data, explicit) = prepare(&schema, attributes);
        self.add_prepared(&schema, data, id.or(explicit), true, &BTreeMap::new())
    }

    /// Swaps a member's id, keeping indices and identifier references to
    /// it consistent. Used when the backend assigns the real id on save.
    #[cfg(feature = "jsonapi")]
    pub(crate) fn change_model_id(
        &self,
        type_name: &str,
        old: &ModelId,
        new: ModelId,
    ) -> crate::Result<()> {
        let mut state = self.shared.state.write().unwrap();
        let Some(key) = state.ids.get_mut(type_name).and_then(|ids| ids.remove(old)) else {
            return Ok(());
        };
        state
            .ids
            .entry(type_name.to_owned())
            .or_default()
            .insert(new.clone(), key);
        let members = state.order.clone();
        drop(state);

        self.shared.arena.adopt_id(key, new, &members)?;
        Ok(())
    }

    /// Serializes the collection: model snapshots in insertion order plus
    /// view membership.
    pub fn to_raw(&self) -> crate::Result<RawCollection> {
        let state = self.shared.state.read().unwrap();
        let keys = state.order.clone();
        let views: BTreeMap<String, _> = state
            .views
            .iter()
            .map(|(name, view)| (name.clone(), view.to_raw()))
            .collect();
        drop(state);

        let mut models = Vec::with_capacity(keys.len());
        for key in keys {
            models.push(self.shared.arena.to_raw(key)?);
        }
        Ok(RawCollection { models, views })
    }

    /// Declares a named view over models of one type.
    ///
    /// # Errors
    ///
    /// [`CollectionError::NameTaken`] when the name is already in use.
    pub fn add_view(
        &self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        options: ViewOptions,
    ) -> crate::Result<View> {
        let name = name.into();
        let mut state = self.shared.state.write().unwrap();
        if state.views.contains_key(&name) {
            return Err(CollectionError::NameTaken { name }.into());
        }
        state
            .views
            .insert(name.clone(), ViewState::new(type_name.into(), options));
        drop(state);
        Ok(View::new(self.clone(), name))
    }

    /// Handle to an existing view.
    pub fn view(&self, name: &str) -> Option<View> {
        self.shared
            .state
            .read()
            .unwrap()
            .views
            .contains_key(name)
            .then(|| View::new(self.clone(), name.to_owned()))
    }

    /// Names of all declared views.
    pub fn view_names(&self) -> Vec<String> {
        self.shared.state.read().unwrap().views.keys().cloned().collect()
    }

    /// Runs a read-only closure against a view's state.
    ///
    /// The closure must only copy data out; resolving models re-enters the
    /// collection and has to happen after the lock is released.
    pub(crate) fn with_view<R>(
        &self,
        name: &str,
        f: impl FnOnce(&ViewState) -> R,
    ) -> crate::Result<R> {
        let state = self.shared.state.read().unwrap();
        let view = state.views.get(name).ok_or_else(|| CollectionError::UnknownView {
            name: name.to_owned(),
        })?;
        Ok(f(view))
    }

    pub(crate) fn with_view_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut ViewState) -> R,
    ) -> crate::Result<R> {
        let mut state = self.shared.state.write().unwrap();
        let view = state
            .views
            .get_mut(name)
            .ok_or_else(|| CollectionError::UnknownView {
                name: name.to_owned(),
            })?;
        Ok(f(view))
    }

    fn keys_snapshot(&self) -> Vec<ModelKey> {
        self.shared.state.read().unwrap().order.clone()
    }

    fn model(&self, key: ModelKey) -> Model {
        Model::from_parts(self.shared.arena.clone(), key)
    }
}

/// Loose `__meta__` block accepted by [`Collection::add_raw`].
#[derive(Default, serde::Deserialize)]
struct PartialMeta {
    #[serde(default)]
    id: Option<ModelId>,
    #[serde(default)]
    persisted: bool,
    #[serde(default)]
    refs: BTreeMap<String, RefDescriptor>,
}

fn raw_map(raw: &RawModel) -> JsonMap {
    match serde_json::to_value(raw) {
        Ok(Value::Object(map)) => map,
        _ => JsonMap::new(),
    }
}
