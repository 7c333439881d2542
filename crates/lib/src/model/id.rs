//! Model identifiers.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// Identifier of one model within its type.
///
/// Stored as a string regardless of how the wire spells it: servers send
/// string or numeric ids, locally generated autoincrement ids are negative
/// numbers rendered as strings, and UUID ids are their canonical text form.
/// Whether an id is server-assigned is tracked separately as the model's
/// `persisted` flag, never inferred from the id's shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModelId(String);

impl ModelId {
    /// Creates an id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        ModelId(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string. Empty ids never address a model.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the id, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for ModelId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        ModelId(id)
    }
}

impl From<&String> for ModelId {
    fn from(id: &String) -> Self {
        ModelId(id.clone())
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        ModelId(id.to_owned())
    }
}

impl From<i64> for ModelId {
    fn from(id: i64) -> Self {
        ModelId(id.to_string())
    }
}

impl From<u64> for ModelId {
    fn from(id: u64) -> Self {
        ModelId(id.to_string())
    }
}

impl From<i32> for ModelId {
    fn from(id: i32) -> Self {
        ModelId(id.to_string())
    }
}

impl PartialEq<str> for ModelId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ModelId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<String> for ModelId {
    fn eq(&self, other: &String) -> bool {
        &self.0 == other
    }
}

impl PartialEq<ModelId> for str {
    fn eq(&self, other: &ModelId) -> bool {
        self == other.0
    }
}

impl PartialEq<ModelId> for &str {
    fn eq(&self, other: &ModelId) -> bool {
        *self == other.0
    }
}

impl PartialEq<ModelId> for String {
    fn eq(&self, other: &ModelId) -> bool {
        self == &other.0
    }
}

// Wire ids may be strings or numbers; both deserialize into the string form.
impl<'de> Deserialize<'de> for ModelId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = ModelId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer model id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ModelId, E> {
                Ok(ModelId(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<ModelId, E> {
                Ok(ModelId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ModelId, E> {
                Ok(ModelId(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ModelId, E> {
                Ok(ModelId(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Identifier pair addressing a model across collections and on the wire.
///
/// Serializes as `{"type": ..., "id": ...}`, which is also the JSON:API
/// resource identifier shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    /// Wire tag of the model type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Id within the type.
    pub id: ModelId,
}

impl ModelRef {
    /// Creates an identifier pair.
    pub fn new(type_name: impl Into<String>, id: impl Into<ModelId>) -> Self {
        ModelRef {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name, self.id)
    }
}
