//! Serialized model and collection forms.
//!
//! A [`RawModel`] is the portable shape of one model: its attribute and
//! reference values flattened into a plain JSON object, plus a `__meta__`
//! block carrying identity and the reference descriptors needed to rebuild
//! buckets. A [`RawCollection`] bundles model snapshots with named view
//! membership. Both shapes round-trip: feeding [`RawCollection`] back into
//! [`Collection::from_raw`](crate::Collection::from_raw) reproduces the
//! same identities, field values and view contents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::JsonMap;
use crate::model::{ModelId, ModelRef};
use crate::schema::FieldKind;

/// Key under which model bookkeeping is stored in serialized form.
pub(crate) const META_KEY: &str = "__meta__";

/// Reference cardinality as recorded in snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefKind {
    One,
    Many,
    OneOrMany,
}

impl RefKind {
    /// Maps a schema field kind to its snapshot form, `None` for attributes.
    pub(crate) fn of_field(kind: &FieldKind) -> Option<RefKind> {
        match kind {
            FieldKind::Attribute => None,
            FieldKind::ToOne(_) => Some(RefKind::One),
            FieldKind::ToMany(_) => Some(RefKind::Many),
            FieldKind::ToOneOrMany(_) => Some(RefKind::OneOrMany),
        }
    }
}

/// Snapshot description of one reference field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefDescriptor {
    /// Wire tag of the referenced type.
    #[serde(rename = "type")]
    pub target: String,
    /// Cardinality of the reference.
    pub kind: RefKind,
}

/// Bookkeeping block of a serialized model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawModelMeta {
    /// Wire tag of the model type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Model id at serialization time.
    pub id: ModelId,
    /// Whether the model has been persisted by the backend.
    #[serde(default)]
    pub persisted: bool,
    /// Reference descriptors, including ones added at runtime, so that
    /// untyped models rebuild their buckets on hydration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refs: BTreeMap<String, RefDescriptor>,
}

/// One serialized model.
///
/// Attribute values and reference values (in identifier form) sit directly
/// on the object next to the `__meta__` block:
///
/// ```json
/// {
///   "__meta__": {"type": "articles", "id": "1", "persisted": true,
///                "refs": {"author": {"type": "people", "kind": "one"}}},
///   "title": "Hello",
///   "author": {"type": "people", "id": "7"}
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawModel {
    #[serde(rename = "__meta__")]
    pub meta: RawModelMeta,
    /// Attribute and reference values keyed by field name.
    #[serde(flatten)]
    pub fields: JsonMap,
}

impl RawModel {
    /// Identifier pair of the serialized model.
    pub fn reference(&self) -> ModelRef {
        ModelRef::new(self.meta.type_name.clone(), self.meta.id.clone())
    }
}

/// Serialized form of a named view: membership and ordering only.
///
/// Comparator-based sort methods cannot be serialized; only the sort field
/// name survives a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawView {
    /// Wire tag the view is restricted to.
    pub model_type: String,
    /// Sort field, when the view sorts by a field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_method: Option<String>,
    /// Whether duplicate membership is suppressed.
    #[serde(default)]
    pub unique: bool,
    /// Member ids in stored order.
    pub models: Vec<ModelId>,
}

/// Serialized form of a whole collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCollection {
    /// Snapshots of every model, in collection order.
    pub models: Vec<RawModel>,
    /// Named views and their membership.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub views: BTreeMap<String, RawView>,
}
