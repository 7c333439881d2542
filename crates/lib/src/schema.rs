//! Model type descriptions.
//!
//! A [`ModelSchema`] declares everything the store needs to know about one
//! model type: its wire tag, its attribute and reference fields, how fresh
//! ids are produced, and the per-type overrides the network adapter consults
//! when it builds request URLs. Schemas are immutable once built and are
//! shared behind [`Arc`]; a [`SchemaRegistry`] maps wire tags to schemas so
//! construction paths that start from raw data can find the right one.
//!
//! Schemas are deliberately permissive about attributes: raw data may carry
//! fields the schema never declared and they are kept as plain attributes.
//! Declared fields add behavior on top of that baseline, such as default
//! values for attributes and bucket wiring for references.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::JsonMap;
use crate::model::ModelId;

/// Names that raw data may never use for an attribute.
///
/// `__meta__` is the bookkeeping block in serialized models and `id` lives
/// in model metadata rather than in the attribute map.
pub(crate) const RESERVED_FIELDS: [&str; 2] = ["__meta__", "id"];

/// Classification of a single schema field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain data field holding an arbitrary JSON value.
    Attribute,
    /// Reference to at most one model of the target type.
    ToOne(String),
    /// Reference to an ordered list of models of the target type.
    ToMany(String),
    /// Reference that holds either a single model or a list, decided by
    /// whichever setter was used last.
    ToOneOrMany(String),
}

impl FieldKind {
    /// Returns `true` for the reference variants.
    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldKind::Attribute)
    }

    /// Target type tag for reference fields, `None` for attributes.
    pub fn target(&self) -> Option<&str> {
        match self {
            FieldKind::Attribute => None,
            FieldKind::ToOne(target) | FieldKind::ToMany(target) | FieldKind::ToOneOrMany(target) => {
                Some(target)
            }
        }
    }
}

/// One named field of a model type.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    /// Field name as it appears in raw data and on the wire.
    pub name: String,
    /// Attribute or reference classification.
    pub kind: FieldKind,
    /// Seeded into new models when construction data omits the field.
    /// Only meaningful for attributes.
    pub default: Option<Value>,
}

impl FieldDescriptor {
    /// Creates a plain attribute descriptor without a default.
    pub fn attribute(name: impl Into<String>) -> Self {
        FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Attribute,
            default: None,
        }
    }
}

/// How ids are assigned to models created without an explicit one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// Decrementing negative counter per schema, rendered as a string.
    /// Marks the model as not yet persisted; the adapter swaps the id for
    /// the server-assigned one on first save.
    #[default]
    Autoincrement,
    /// Random UUIDv4, suitable when the client owns id assignment.
    Uuid,
    /// No generation. Construction without an explicit id fails.
    Manual,
}

/// Per-type request path override used by the network adapter.
#[derive(Clone)]
pub enum Endpoint {
    /// Fixed path segment, used verbatim.
    Fixed(String),
    /// Path computed at request time.
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Endpoint {
    /// Resolves the endpoint to a concrete path segment.
    pub fn resolve(&self) -> String {
        match self {
            Endpoint::Fixed(path) => path.clone(),
            Endpoint::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Fixed(path) => f.debug_tuple("Fixed").field(path).finish(),
            Endpoint::Dynamic(_) => f.debug_tuple("Dynamic").field(&"..").finish(),
        }
    }
}

/// Hook applied to raw attribute data before it is stored.
pub type PreprocessFn = Arc<dyn Fn(&mut JsonMap) + Send + Sync>;

/// Immutable description of one model type.
///
/// Built through [`ModelSchema::builder`] and usually registered in a
/// [`SchemaRegistry`] straight away:
///
/// ```
/// use engram::{FieldKind, ModelSchema, SchemaRegistry};
///
/// let registry = SchemaRegistry::new();
/// let articles = ModelSchema::builder("articles")
///     .attribute("title")
///     .to_one("author", "people")
///     .build()?;
/// registry.register(articles);
///
/// let schema = registry.schema("articles").unwrap();
/// assert_eq!(schema.field("author").map(|f| &f.kind),
///            Some(&FieldKind::ToOne("people".into())));
/// # Ok::<(), engram::Error>(())
/// ```
pub struct ModelSchema {
    type_name: String,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
    id_strategy: IdStrategy,
    counter: AtomicI64,
    endpoint: Option<Endpoint>,
    base_url: Option<String>,
    send_auto_id: bool,
    preprocess: Option<PreprocessFn>,
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("id_strategy", &self.id_strategy)
            .field("endpoint", &self.endpoint)
            .field("base_url", &self.base_url)
            .field("send_auto_id", &self.send_auto_id)
            .finish_non_exhaustive()
    }
}

impl ModelSchema {
    /// Starts a builder for the given wire tag.
    pub fn builder(type_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(type_name)
    }

    /// Schema for an untyped model: no declared fields, autoincrement ids.
    ///
    /// Used as the fallback when wire data references a type nobody
    /// registered, so that no payload is ever dropped.
    pub fn generic(type_name: impl Into<String>) -> Self {
        ModelSchema {
            type_name: type_name.into(),
            fields: Vec::new(),
            index: HashMap::new(),
            id_strategy: IdStrategy::Autoincrement,
            counter: AtomicI64::new(0),
            endpoint: None,
            base_url: None,
            send_auto_id: false,
            preprocess: None,
        }
    }

    /// Wire tag of this model type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Id assignment strategy for this type.
    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Request path override, if any.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Per-type base path override, if any. Weaker than [`Self::endpoint`].
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Whether locally generated ids are included in create requests.
    pub fn send_auto_id(&self) -> bool {
        self.send_auto_id
    }

    /// Runs the preprocess hook over raw attribute data, when one is set.
    pub(crate) fn run_preprocess(&self, data: &mut JsonMap) {
        if let Some(hook) = &self.preprocess {
            hook(data);
        }
    }

    /// Produces the next generated id, or `None` under [`IdStrategy::Manual`].
    pub(crate) fn next_id(&self) -> Option<ModelId> {
        match self.id_strategy {
            IdStrategy::Autoincrement => {
                let next = self.counter.fetch_sub(1, Ordering::Relaxed) - 1;
                Some(ModelId::from(next.to_string()))
            }
            IdStrategy::Uuid => Some(ModelId::from(Uuid::new_v4().to_string())),
            IdStrategy::Manual => None,
        }
    }
}

/// Chained builder for [`ModelSchema`].
#[derive(Default)]
pub struct SchemaBuilder {
    type_name: String,
    fields: Vec<FieldDescriptor>,
    id_strategy: IdStrategy,
    endpoint: Option<Endpoint>,
    base_url: Option<String>,
    send_auto_id: bool,
    preprocess: Option<PreprocessFn>,
}

impl SchemaBuilder {
    fn new(type_name: impl Into<String>) -> Self {
        SchemaBuilder {
            type_name: type_name.into(),
            ..SchemaBuilder::default()
        }
    }

    /// Declares a plain attribute.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor::attribute(name));
        self
    }

    /// Declares an attribute seeded with a default value.
    pub fn attribute_with_default(mut self, name: impl Into<String>, default: Value) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Attribute,
            default: Some(default),
        });
        self
    }

    /// Declares a to-one reference to `target`.
    pub fn to_one(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::ToOne(target.into()),
            default: None,
        });
        self
    }

    /// Declares a to-many reference to `target`.
    pub fn to_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::ToMany(target.into()),
            default: None,
        });
        self
    }

    /// Declares a reference to `target` that may hold one model or a list.
    pub fn to_one_or_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::ToOneOrMany(target.into()),
            default: None,
        });
        self
    }

    /// Adds a prebuilt field descriptor.
    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.push(descriptor);
        self
    }

    /// Sets the id assignment strategy. Defaults to autoincrement.
    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Sets a fixed request path for this type.
    pub fn endpoint(mut self, path: impl Into<String>) -> Self {
        self.endpoint = Some(Endpoint::Fixed(path.into()));
        self
    }

    /// Sets a request path computed at request time.
    pub fn endpoint_with(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.endpoint = Some(Endpoint::Dynamic(Arc::new(f)));
        self
    }

    /// Sets a per-type base path, consulted when no endpoint is set.
    pub fn base_url(mut self, path: impl Into<String>) -> Self {
        self.base_url = Some(path.into());
        self
    }

    /// Includes locally generated ids in create requests.
    pub fn send_auto_id(mut self, send: bool) -> Self {
        self.send_auto_id = send;
        self
    }

    /// Installs a hook that rewrites raw attribute data before storage.
    pub fn preprocess(mut self, f: impl Fn(&mut JsonMap) + Send + Sync + 'static) -> Self {
        self.preprocess = Some(Arc::new(f));
        self
    }

    /// Finalizes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::EmptyTypeName`] for an empty wire tag,
    /// [`SchemaError::ReservedField`] when a field uses a bookkeeping name,
    /// and [`SchemaError::DuplicateField`] when a name is declared twice.
    pub fn build(self) -> Result<ModelSchema, SchemaError> {
        if self.type_name.is_empty() {
            return Err(SchemaError::EmptyTypeName);
        }
        let mut index = HashMap::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            if RESERVED_FIELDS.contains(&field.name.as_str()) {
                return Err(SchemaError::ReservedField {
                    field: field.name.clone(),
                });
            }
            if index.insert(field.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateField {
                    type_name: self.type_name,
                    field: field.name.clone(),
                });
            }
        }
        Ok(ModelSchema {
            type_name: self.type_name,
            fields: self.fields,
            index,
            id_strategy: self.id_strategy,
            counter: AtomicI64::new(0),
            endpoint: self.endpoint,
            base_url: self.base_url,
            send_auto_id: self.send_auto_id,
            preprocess: self.preprocess,
        })
    }
}

/// Errors raised while building a schema.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// The same field name was declared twice.
    #[error("field '{field}' is declared twice on type '{type_name}'")]
    DuplicateField { type_name: String, field: String },

    /// The field name collides with internal bookkeeping.
    #[error("field name '{field}' is reserved")]
    ReservedField { field: String },

    /// The wire tag was empty.
    #[error("model type tag cannot be empty")]
    EmptyTypeName,
}

// Conversion to the main Error type
impl From<SchemaError> for crate::Error {
    fn from(err: SchemaError) -> Self {
        crate::Error::Schema(err)
    }
}

/// Shared map from wire tags to schemas.
///
/// Cloning is cheap and clones observe later registrations.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<ModelSchema>>>>,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types = self.inner.read().unwrap();
        f.debug_struct("SchemaRegistry")
            .field("types", &types.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Registers a schema under its wire tag, replacing any previous entry.
    ///
    /// Returns the shared handle under which the schema is stored.
    pub fn register(&self, schema: ModelSchema) -> Arc<ModelSchema> {
        let schema = Arc::new(schema);
        self.inner
            .write()
            .unwrap()
            .insert(schema.type_name().to_owned(), Arc::clone(&schema));
        schema
    }

    /// Looks up the schema for a wire tag.
    pub fn schema(&self, type_name: &str) -> Option<Arc<ModelSchema>> {
        self.inner.read().unwrap().get(type_name).cloned()
    }

    /// Returns `true` when a schema is registered for the wire tag.
    pub fn contains(&self, type_name: &str) -> bool {
        self.inner.read().unwrap().contains_key(type_name)
    }

    /// Returns the schema for a wire tag, registering a generic fallback
    /// when nobody declared the type.
    pub(crate) fn ensure(&self, type_name: &str) -> Arc<ModelSchema> {
        if let Some(schema) = self.schema(type_name) {
            return schema;
        }
        self.register(ModelSchema::generic(type_name))
    }
}
