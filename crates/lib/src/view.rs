//! Named, ordered projections over one type of a collection's models.
//!
//! A [`View`] stores identifiers, never model instances. Resolution
//! happens on every [`View::list`] call against the current collection
//! contents, so a view stays correct as models are added, updated and
//! removed around it. Sorting is likewise re-evaluated per call: a field
//! sort reads the field's live value, a comparator sort runs the caller's
//! ordering over the resolved models.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::collection::{Collection, CollectionError};
use crate::model::{Model, ModelId, ModelRef};
use crate::snapshot::RawView;

/// Caller-supplied ordering over resolved models.
pub type Comparator = Arc<dyn Fn(&Model, &Model) -> Ordering + Send + Sync>;

/// How a view orders its models.
#[derive(Clone)]
pub enum SortMethod {
    /// Sort by a field's current value, ascending. Missing values sort
    /// first.
    Field(String),
    /// Sort with an arbitrary comparator. Not serializable: a snapshot of
    /// a comparator-sorted view records no sort method.
    With(Comparator),
}

impl fmt::Debug for SortMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortMethod::Field(field) => f.debug_tuple("Field").field(field).finish(),
            SortMethod::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Configuration for [`Collection::add_view`].
#[derive(Clone, Debug, Default)]
pub struct ViewOptions {
    pub sort: Option<SortMethod>,
    pub unique: bool,
    /// Initial contents, useful when restoring a serialized view against
    /// an independently-hydrated collection.
    pub models: Vec<ModelId>,
}

impl ViewOptions {
    pub fn new() -> ViewOptions {
        ViewOptions::default()
    }

    /// Sorts by a field's value.
    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(SortMethod::Field(field.into()));
        self
    }

    /// Sorts with a comparator.
    pub fn sort_with(
        mut self,
        comparator: impl Fn(&Model, &Model) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.sort = Some(SortMethod::With(Arc::new(comparator)));
        self
    }

    /// Rejects duplicate identifiers; re-adding an existing id moves it to
    /// the end instead of duplicating it.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Seeds the view's contents.
    pub fn models(mut self, ids: Vec<ModelId>) -> Self {
        self.models = ids;
        self
    }
}

/// Stored state of one view, kept inside the collection.
#[derive(Clone)]
pub(crate) struct ViewState {
    pub(crate) model_type: String,
    pub(crate) sort: Option<SortMethod>,
    pub(crate) unique: bool,
    pub(crate) refs: Vec<ModelId>,
}

impl ViewState {
    pub(crate) fn new(model_type: String, options: ViewOptions) -> ViewState {
        ViewState {
            model_type,
            sort: options.sort,
            unique: options.unique,
            refs: options.models,
        }
    }

    pub(crate) fn from_raw(raw: RawView) -> ViewState {
        ViewState {
            model_type: raw.model_type,
            sort: raw.sort_method.map(SortMethod::Field),
            unique: raw.unique,
            refs: raw.models,
        }
    }

    pub(crate) fn to_raw(&self) -> RawView {
        RawView {
            model_type: self.model_type.clone(),
            sort_method: match &self.sort {
                Some(SortMethod::Field(field)) => Some(field.clone()),
                _ => None,
            },
            unique: self.unique,
            models: self.refs.clone(),
        }
    }

    /// Appends an id, honoring the unique flag.
    pub(crate) fn push(&mut self, id: ModelId) {
        if self.unique && let Some(pos) = self.refs.iter().position(|r| *r == id) {
            self.refs.remove(pos);
        }
        self.refs.push(id);
    }
}

/// Handle to a named view declared on a [`Collection`].
///
/// Cheap to clone; all state lives in the collection, so two handles with
/// the same name observe the same contents.
#[derive(Clone)]
pub struct View {
    collection: Collection,
    name: String,
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").field("name", &self.name).finish()
    }
}

impl View {
    pub(crate) fn new(collection: Collection, name: String) -> View {
        View { collection, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The type of model this view tracks.
    pub fn model_type(&self) -> crate::Result<String> {
        self.collection
            .with_view(&self.name, |view| view.model_type.clone())
    }

    pub fn is_unique(&self) -> crate::Result<bool> {
        self.collection.with_view(&self.name, |view| view.unique)
    }

    /// Number of stored identifiers, resolved or not.
    pub fn len(&self) -> crate::Result<usize> {
        self.collection.with_view(&self.name, |view| view.refs.len())
    }

    pub fn is_empty(&self) -> crate::Result<bool> {
        self.collection.with_view(&self.name, |view| view.refs.is_empty())
    }

    /// Stored identifiers in stored (unsorted) order.
    pub fn ids(&self) -> crate::Result<Vec<ModelId>> {
        self.collection.with_view(&self.name, |view| view.refs.clone())
    }

    /// Resolves and orders the view's models.
    ///
    /// Identifiers without a matching model in the collection are skipped.
    /// The sort is stable, so equal models keep their stored order.
    pub fn list(&self) -> crate::Result<Vec<Model>> {
        let (model_type, sort, refs) = self.collection.with_view(&self.name, |view| {
            (view.model_type.clone(), view.sort.clone(), view.refs.clone())
        })?;
        let mut models: Vec<Model> = refs
            .into_iter()
            .filter_map(|id| self.collection.find_one(&model_type, id))
            .collect();
        match sort {
            Some(SortMethod::Field(field)) => {
                models.sort_by(|a, b| {
                    json_cmp(
                        a.get(&field).ok().flatten().as_ref(),
                        b.get(&field).ok().flatten().as_ref(),
                    )
                });
            }
            Some(SortMethod::With(comparator)) => {
                models.sort_by(|a, b| comparator(a, b));
            }
            None => {}
        }
        Ok(models)
    }

    /// Adds a model to the view, inserting it into the collection first
    /// when it is not yet a member.
    ///
    /// # Errors
    ///
    /// [`CollectionError::ViewTypeMismatch`] when the model's type differs
    /// from the view's, plus anything [`Collection::add`] can return.
    pub fn add(&self, model: &Model) -> crate::Result<()> {
        let r = model.to_ref()?;
        self.check_type(&r)?;
        self.collection.add(model)?;
        self.collection
            .with_view_mut(&self.name, |view| view.push(r.id))
    }

    /// Records an identifier without requiring the model to exist yet;
    /// [`Self::list`] picks it up once the collection holds it.
    ///
    /// # Errors
    ///
    /// [`CollectionError::ViewTypeMismatch`] when the identifier's type
    /// differs from the view's.
    pub fn add_ref(&self, r: &ModelRef) -> crate::Result<()> {
        self.check_type(r)?;
        self.collection
            .with_view_mut(&self.name, |view| view.push(r.id.clone()))
    }

    /// Drops every occurrence of the model's id. The model stays in the
    /// collection.
    pub fn remove(&self, model: &Model) -> crate::Result<()> {
        let id = model.id()?;
        self.collection
            .with_view_mut(&self.name, |view| view.refs.retain(|r| *r != id))
    }

    /// Empties the view. The collection is untouched.
    pub fn remove_all(&self) -> crate::Result<()> {
        self.collection
            .with_view_mut(&self.name, |view| view.refs.clear())
    }

    /// Whether the model's id is currently in the view.
    pub fn has_item(&self, model: &Model) -> crate::Result<bool> {
        let id = model.id()?;
        self.collection
            .with_view(&self.name, |view| view.refs.contains(&id))
    }

    /// Serializes identifier order only; model payloads are the
    /// collection's responsibility.
    pub fn to_raw(&self) -> crate::Result<RawView> {
        self.collection.with_view(&self.name, ViewState::to_raw)
    }

    fn check_type(&self, r: &ModelRef) -> crate::Result<()> {
        let expected = self.model_type()?;
        if r.type_name != expected {
            return Err(CollectionError::ViewTypeMismatch {
                name: self.name.clone(),
                expected,
                actual: r.type_name.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Total order over JSON values for field sorts: null, then booleans,
/// numbers, strings, arrays and objects; missing values first.
fn json_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => value_cmp(a, b),
    }
}

fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(a, b)| value_cmp(a, b))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => a
            .iter()
            .zip(b.iter())
            .map(|((ak, av), (bk, bv))| ak.cmp(bk).then_with(|| value_cmp(av, bv)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
