//! Serde form of the JSON:API wire document.
//!
//! These types cover the subset of the format the adapter exchanges:
//! primary `data` in singular or plural form, `included` side-loads,
//! `relationships` with identifier data, `links`, `meta` and both error
//! conventions (the spec's `errors` array and the legacy singular
//! `error`). Everything else a server sends survives round-trips inside
//! the untyped `meta`/`links` maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::JsonMap;
use crate::bucket::RefValue;
use crate::model::{ModelId, ModelRef};

/// A JSON:API document, request or response side.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorObject>>,
    /// Legacy singular error payload; anything the server put there.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    pub meta: JsonMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, Link>,
}

impl Document {
    /// Wraps one resource as the primary data of a request document.
    pub fn with_resource(resource: Resource) -> Document {
        Document {
            data: Some(PrimaryData::One(Box::new(resource))),
            ..Document::default()
        }
    }

    /// Whether the document carries an error payload in either convention.
    pub fn has_errors(&self) -> bool {
        self.error.is_some() || self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }

    /// Error objects in normalized form; the singular `error` becomes one
    /// object with its payload as the detail.
    pub fn error_objects(&self) -> Vec<ErrorObject> {
        let mut objects = self.errors.clone().unwrap_or_default();
        if let Some(error) = &self.error {
            let detail = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            objects.push(ErrorObject {
                detail: Some(detail),
                ..ErrorObject::default()
            });
        }
        objects
    }

    /// Primary resources, regardless of singular or plural form.
    pub fn primary_resources(&self) -> Vec<&Resource> {
        match &self.data {
            Some(PrimaryData::One(resource)) => vec![resource],
            Some(PrimaryData::Many(resources)) => resources.iter().collect(),
            None => Vec::new(),
        }
    }
}

/// Primary `data`: one resource object or a list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Box<Resource>),
    Many(Vec<Resource>),
}

/// One resource object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ModelId>,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub attributes: JsonMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, Link>,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub meta: JsonMap,
}

impl Resource {
    pub fn new(type_name: impl Into<String>) -> Resource {
        Resource {
            type_name: type_name.into(),
            id: None,
            attributes: JsonMap::new(),
            relationships: BTreeMap::new(),
            links: BTreeMap::new(),
            meta: JsonMap::new(),
        }
    }

    /// The identifier pair, when the resource carries an id.
    pub fn reference(&self) -> Option<ModelRef> {
        self.id
            .clone()
            .map(|id| ModelRef::new(self.type_name.clone(), id))
    }
}

/// One relationship entry.
///
/// The `data` key is tri-state on the wire and the distinction matters for
/// normalization: an absent key means the relationship was not mentioned
/// (leave the local value alone), an explicit `null` means it was cleared,
/// and identifiers mean assignment. `None` here is the absent case; a
/// present `null` deserializes to `Some(RefValue::One(None))`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_data"
    )]
    pub data: Option<RefValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, Link>,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub meta: JsonMap,
}

impl Relationship {
    pub fn with_data(data: RefValue) -> Relationship {
        Relationship {
            data: Some(data),
            ..Relationship::default()
        }
    }
}

/// Only runs when the `data` key is present, so `null` can be told apart
/// from an omitted key.
fn present_data<'de, D>(deserializer: D) -> Result<Option<RefValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Some(RefValue::One(None)));
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// A link: bare URL string or object form.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
    Plain(String),
    Object {
        href: String,
        #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
        meta: JsonMap,
    },
}

impl Link {
    pub fn href(&self) -> &str {
        match self {
            Link::Plain(href) => href,
            Link::Object { href, .. } => href,
        }
    }
}

/// One error object from a document's `errors` array.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    pub meta: JsonMap,
}

/// Pointer to the part of the request an error refers to.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}
