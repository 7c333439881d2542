//! Reference buckets.
//!
//! A bucket is the storage slot behind one reference field. It records what
//! the field points at, either as a live arena key or as an unresolved
//! identifier pair, and resolves those entries against the collection its
//! model currently belongs to. Resolution is a pure lookup: it never
//! inserts models and never fails on a missing target, it simply yields
//! nothing until the target shows up.
//!
//! Cardinality is part of the bucket's shape. `ToOne` and `ToMany` keep
//! their shape forever; `ToOneOrMany` starts single-valued and is
//! reinterpreted only by the explicit single/list setters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::arena::{Arena, ModelKey};
use crate::collection::WeakCollection;
use crate::model::{Model, ModelError, ModelId, ModelRef};
use crate::snapshot::RefKind;

/// One slot of a bucket: a live model or an identifier still to resolve.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RefEntry {
    /// Model known to live in the same arena.
    Key(ModelKey),
    /// Identifier pair resolved against the bound collection on read.
    Ref(ModelRef),
}

impl RefEntry {
    fn matches(&self, key: ModelKey, target: &ModelRef) -> bool {
        match self {
            RefEntry::Key(k) => *k == key,
            RefEntry::Ref(r) => r == target,
        }
    }
}

/// Reference value projected to identifier form.
///
/// Serializes to the JSON:API relationship `data` shape: `null`, one
/// identifier object, or an array of identifier objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefValue {
    /// Single-valued reference, possibly empty.
    One(Option<ModelRef>),
    /// List-valued reference.
    Many(Vec<ModelRef>),
}

impl RefValue {
    /// `true` when the reference points at nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            RefValue::One(one) => one.is_none(),
            RefValue::Many(many) => many.is_empty(),
        }
    }

    /// All identifiers held, regardless of cardinality.
    pub fn refs(&self) -> Vec<ModelRef> {
        match self {
            RefValue::One(one) => one.iter().cloned().collect(),
            RefValue::Many(many) => many.clone(),
        }
    }
}

/// Accepted input for reference setters.
///
/// Converts from models and identifier pairs, so call sites can pass
/// whichever they hold: `model.set_one("author", Some((&person).into()))`.
#[derive(Clone, Debug)]
pub enum RefInput {
    /// A live model handle.
    Model(Model),
    /// An identifier pair, resolved lazily against the collection.
    Ref(ModelRef),
}

impl From<Model> for RefInput {
    fn from(model: Model) -> Self {
        RefInput::Model(model)
    }
}

impl From<&Model> for RefInput {
    fn from(model: &Model) -> Self {
        RefInput::Model(model.clone())
    }
}

impl From<ModelRef> for RefInput {
    fn from(r: ModelRef) -> Self {
        RefInput::Ref(r)
    }
}

impl From<&ModelRef> for RefInput {
    fn from(r: &ModelRef) -> Self {
        RefInput::Ref(r.clone())
    }
}

impl RefInput {
    /// Lowers the input to a bucket entry for a model living in `arena`.
    ///
    /// Models from a different arena are stored by identifier instead of
    /// by key, since keys only address their own arena.
    pub(crate) fn into_entry(self, arena: &Arena) -> crate::Result<RefEntry> {
        match self {
            RefInput::Model(model) => {
                if model.arena().same(arena) {
                    Ok(RefEntry::Key(model.key()))
                } else {
                    Ok(RefEntry::Ref(model.to_ref()?))
                }
            }
            RefInput::Ref(r) => Ok(RefEntry::Ref(r)),
        }
    }
}

#[derive(Clone, Debug)]
enum Shape {
    One(Option<RefEntry>),
    Many(Vec<RefEntry>),
    OneOrMany(OneOrMany),
}

#[derive(Clone, Debug)]
enum OneOrMany {
    Single(Option<RefEntry>),
    Multiple(Vec<RefEntry>),
}

/// Storage behind one reference field of one model.
#[derive(Clone, Debug)]
pub(crate) struct Bucket {
    target: String,
    shape: Shape,
    collection: WeakCollection,
}

impl Bucket {
    /// Creates an empty bucket of the given cardinality.
    pub(crate) fn new(kind: RefKind, target: impl Into<String>) -> Bucket {
        let shape = match kind {
            RefKind::One => Shape::One(None),
            RefKind::Many => Shape::Many(Vec::new()),
            RefKind::OneOrMany => Shape::OneOrMany(OneOrMany::Single(None)),
        };
        Bucket {
            target: target.into(),
            shape,
            collection: WeakCollection::empty(),
        }
    }

    pub(crate) fn kind(&self) -> RefKind {
        match &self.shape {
            Shape::One(_) => RefKind::One,
            Shape::Many(_) => RefKind::Many,
            Shape::OneOrMany(_) => RefKind::OneOrMany,
        }
    }

    pub(crate) fn target(&self) -> &str {
        &self.target
    }

    /// Name of the current cardinality, for error reports.
    fn shape_name(&self) -> &'static str {
        match &self.shape {
            Shape::One(_) | Shape::OneOrMany(OneOrMany::Single(_)) => "single",
            Shape::Many(_) | Shape::OneOrMany(OneOrMany::Multiple(_)) => "list",
        }
    }

    pub(crate) fn set_collection(&mut self, collection: WeakCollection) {
        self.collection = collection;
    }

    /// Replaces the contents from a raw JSON value.
    ///
    /// Accepts `null`, identifier objects, scalar ids (typed by the
    /// bucket's target), and arrays of either. Anything else clears the
    /// slot it was aimed at.
    pub(crate) fn assign_value(&mut self, value: &Value) {
        match &mut self.shape {
            Shape::One(slot) => {
                *slot = first_entry(value, &self.target);
            }
            Shape::Many(entries) => {
                *entries = all_entries(value, &self.target);
            }
            Shape::OneOrMany(inner) => {
                *inner = if value.is_array() {
                    OneOrMany::Multiple(all_entries(value, &self.target))
                } else {
                    OneOrMany::Single(first_entry(value, &self.target))
                };
            }
        }
    }

    /// Sets the single-valued side.
    ///
    /// Reinterprets a `ToOneOrMany` bucket as single-valued; fails on
    /// `ToMany` buckets.
    pub(crate) fn assign_one(
        &mut self,
        entry: Option<RefEntry>,
        field: &str,
    ) -> Result<(), ModelError> {
        match &mut self.shape {
            Shape::One(slot) => {
                *slot = entry;
                Ok(())
            }
            Shape::Many(_) => Err(ModelError::CardinalityMismatch {
                field: field.to_owned(),
                expected: "single",
                actual: self.shape_name(),
            }),
            Shape::OneOrMany(inner) => {
                *inner = OneOrMany::Single(entry);
                Ok(())
            }
        }
    }

    /// Sets the list-valued side.
    ///
    /// Reinterprets a `ToOneOrMany` bucket as list-valued; fails on `ToOne`
    /// buckets.
    pub(crate) fn assign_many(
        &mut self,
        entries: Vec<RefEntry>,
        field: &str,
    ) -> Result<(), ModelError> {
        match &mut self.shape {
            Shape::One(_) => Err(ModelError::CardinalityMismatch {
                field: field.to_owned(),
                expected: "list",
                actual: self.shape_name(),
            }),
            Shape::Many(slot) => {
                *slot = entries;
                Ok(())
            }
            Shape::OneOrMany(inner) => {
                *inner = OneOrMany::Multiple(entries);
                Ok(())
            }
        }
    }

    /// Resolves the single-valued side against the bound collection.
    pub(crate) fn resolve_one(
        &self,
        arena: &Arena,
        field: &str,
    ) -> Result<Option<Model>, ModelError> {
        match &self.shape {
            Shape::One(slot) | Shape::OneOrMany(OneOrMany::Single(slot)) => Ok(slot
                .as_ref()
                .and_then(|entry| resolve_entry(entry, arena, &self.collection))),
            Shape::Many(_) | Shape::OneOrMany(OneOrMany::Multiple(_)) => {
                Err(ModelError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "single",
                    actual: self.shape_name(),
                })
            }
        }
    }

    /// Resolves the list-valued side, skipping entries that do not resolve.
    pub(crate) fn resolve_many(
        &self,
        arena: &Arena,
        field: &str,
    ) -> Result<Vec<Model>, ModelError> {
        match &self.shape {
            Shape::Many(entries) | Shape::OneOrMany(OneOrMany::Multiple(entries)) => Ok(entries
                .iter()
                .filter_map(|entry| resolve_entry(entry, arena, &self.collection))
                .collect()),
            Shape::One(_) | Shape::OneOrMany(OneOrMany::Single(_)) => {
                Err(ModelError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "list",
                    actual: self.shape_name(),
                })
            }
        }
    }

    /// Projects the contents to identifier form.
    ///
    /// Entries whose identity cannot be determined any more are dropped
    /// from the projection.
    pub(crate) fn ref_value(&self, arena: &Arena) -> RefValue {
        match &self.shape {
            Shape::One(slot) | Shape::OneOrMany(OneOrMany::Single(slot)) => RefValue::One(
                slot.as_ref().and_then(|entry| entry_to_ref(entry, arena)),
            ),
            Shape::Many(entries) | Shape::OneOrMany(OneOrMany::Multiple(entries)) => RefValue::Many(
                entries
                    .iter()
                    .filter_map(|entry| entry_to_ref(entry, arena))
                    .collect(),
            ),
        }
    }

    /// Rewrites identifier entries when a model's id changes.
    ///
    /// Key entries need no rewrite; they track the model itself.
    pub(crate) fn rewrite_ref(&mut self, old: &ModelRef, new: &ModelRef) -> bool {
        let mut changed = false;
        let rewrite = |entry: &mut RefEntry| {
            if let RefEntry::Ref(r) = entry
                && r == old
            {
                *r = new.clone();
                return true;
            }
            false
        };
        match &mut self.shape {
            Shape::One(slot) | Shape::OneOrMany(OneOrMany::Single(slot)) => {
                if let Some(entry) = slot {
                    changed = rewrite(entry);
                }
            }
            Shape::Many(entries) | Shape::OneOrMany(OneOrMany::Multiple(entries)) => {
                for entry in entries {
                    changed |= rewrite(entry);
                }
            }
        }
        changed
    }

    /// Drops every entry pointing at the removed model.
    ///
    /// Returns `true` when the bucket changed.
    pub(crate) fn scrub(&mut self, key: ModelKey, target: &ModelRef) -> bool {
        match &mut self.shape {
            Shape::One(slot) | Shape::OneOrMany(OneOrMany::Single(slot)) => {
                if slot.as_ref().is_some_and(|e| e.matches(key, target)) {
                    *slot = None;
                    true
                } else {
                    false
                }
            }
            Shape::Many(entries) | Shape::OneOrMany(OneOrMany::Multiple(entries)) => {
                let before = entries.len();
                entries.retain(|e| !e.matches(key, target));
                entries.len() != before
            }
        }
    }
}

fn resolve_entry(entry: &RefEntry, arena: &Arena, collection: &WeakCollection) -> Option<Model> {
    match entry {
        RefEntry::Key(key) => arena.handle_if_present(*key),
        RefEntry::Ref(r) => collection.upgrade()?.find_ref(r),
    }
}

fn entry_to_ref(entry: &RefEntry, arena: &Arena) -> Option<ModelRef> {
    match entry {
        RefEntry::Key(key) => arena.ref_of(*key).ok(),
        RefEntry::Ref(r) => Some(r.clone()),
    }
}

fn parse_entry(value: &Value, target: &str) -> Option<RefEntry> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(RefEntry::Ref(ModelRef::new(target, s.as_str()))),
        Value::Number(n) => Some(RefEntry::Ref(ModelRef::new(
            target,
            ModelId::from(n.to_string()),
        ))),
        Value::Object(_) => serde_json::from_value::<ModelRef>(value.clone())
            .ok()
            .map(RefEntry::Ref),
        _ => None,
    }
}

fn first_entry(value: &Value, target: &str) -> Option<RefEntry> {
    match value {
        Value::Array(items) => items.first().and_then(|v| parse_entry(v, target)),
        other => parse_entry(other, target),
    }
}

fn all_entries(value: &Value, target: &str) -> Vec<RefEntry> {
    match value {
        Value::Array(items) => items.iter().filter_map(|v| parse_entry(v, target)).collect(),
        other => parse_entry(other, target).into_iter().collect(),
    }
}
