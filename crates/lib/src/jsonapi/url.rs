//! Deterministic request URL construction.
//!
//! The grammar is fixed. The resource path comes from the schema's
//! endpoint, the schema's base URL joined with the type tag, or the bare
//! type tag, with an id segment appended for single-resource calls. Query
//! parameters follow in a deterministic order: `filter[..]`, `sort`,
//! `include`, `fields[type]`, then raw passthrough pairs. Nested filter
//! maps flatten to dotted bracket paths (`filter[author.name]=v`) and
//! arrays follow the configured
//! [`ParamArrayType`](super::ParamArrayType).
//!
//! Values are interpolated verbatim; no percent-encoding is applied.
//! Callers own the escaping of anything that would break a URL.

use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use crate::JsonMap;
use crate::model::ModelId;
use crate::schema::{Endpoint, SchemaRegistry};

use super::config::{NetworkConfig, ParamArrayType};

/// One raw query pair, appended after the structured parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPair {
    pub key: String,
    pub value: String,
}

impl QueryPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> QueryPair {
        QueryPair {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for QueryPair {
    fn from((key, value): (K, V)) -> QueryPair {
        QueryPair::new(key, value)
    }
}

/// Per-request options: query structure plus headers layered over the
/// client's configured ones.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub filter: Option<JsonMap>,
    pub sort: Vec<String>,
    pub include: Vec<String>,
    pub fields: BTreeMap<String, Vec<String>>,
    pub params: Vec<QueryPair>,
    pub headers: BTreeMap<String, String>,
}

impl RequestOptions {
    pub fn new() -> RequestOptions {
        RequestOptions::default()
    }

    /// Sets the filter tree. Non-object values are ignored; filters are
    /// keyed structures by construction.
    pub fn filter(mut self, filter: Value) -> Self {
        if let Value::Object(map) = filter {
            self.filter = Some(map);
        }
        self
    }

    /// Appends a sort field; prefix with `-` for descending.
    pub fn sort(mut self, field: impl Into<String>) -> Self {
        self.sort.push(field.into());
        self
    }

    /// Appends a relationship path to side-load.
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.include.push(relation.into());
        self
    }

    /// Restricts the returned attributes for one type.
    pub fn fields<I>(mut self, type_name: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.fields
            .insert(type_name.into(), names.into_iter().map(Into::into).collect());
        self
    }

    /// Appends a raw query pair, emitted last and verbatim.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(QueryPair::new(key, value));
        self
    }

    /// Adds a header for this request, overriding the client config's
    /// header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Resolves the wire path for a type and assembles the full request URL.
///
/// Path priority: schema `endpoint` (static or computed), then schema
/// `base_url` joined with the type tag, then the bare type tag. Absolute
/// paths bypass the config's `base_url` prefix.
pub(crate) fn prepare_query(
    type_name: &str,
    id: Option<&ModelId>,
    options: &RequestOptions,
    registry: &SchemaRegistry,
    config: &NetworkConfig,
) -> String {
    let schema = registry.schema(type_name);
    let mut path = schema
        .as_ref()
        .and_then(|schema| schema.endpoint().map(Endpoint::resolve))
        .unwrap_or_else(|| match schema.as_ref().and_then(|schema| schema.base_url()) {
            Some(base) => join_path(base, type_name),
            None => type_name.to_owned(),
        });
    if let Some(id) = id {
        path = join_path(&path, id.as_str());
    }
    build_url(&resolve_base(&path, config), options, config)
}

/// Appends the query string to a resolved path.
pub fn build_url(path: &str, options: &RequestOptions, config: &NetworkConfig) -> String {
    let mut params: Vec<String> = Vec::new();

    if let Some(filter) = &options.filter {
        let mut pairs = Vec::new();
        parametrize(filter, "", config.param_array_type(), &mut pairs);
        params.extend(
            pairs
                .into_iter()
                .map(|(key, value)| format!("filter[{key}]={value}")),
        );
    }
    if !options.sort.is_empty() {
        params.push(format!("sort={}", options.sort.join(",")));
    }
    if !options.include.is_empty() {
        params.push(format!("include={}", options.include.join(",")));
    }
    for (type_name, names) in &options.fields {
        params.push(format!("fields[{type_name}]={}", names.join(",")));
    }
    for pair in &options.params {
        params.push(format!("{}={}", pair.key, pair.value));
    }

    if params.is_empty() {
        return path.to_owned();
    }
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{}", params.join("&"))
}

/// Prefixes relative paths with the configured base URL.
pub(crate) fn resolve_base(path: &str, config: &NetworkConfig) -> String {
    if is_absolute(path) {
        path.to_owned()
    } else {
        join_path(config.base_url(), path)
    }
}

/// Absolute means parseable with a host, or protocol-relative.
pub(crate) fn is_absolute(url: &str) -> bool {
    url.starts_with("//") || Url::parse(url).map(|parsed| parsed.has_host()).unwrap_or(false)
}

/// Joins two path segments with exactly one slash.
pub(crate) fn join_path(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_owned();
    }
    if path.is_empty() {
        return base.to_owned();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Flattens a filter tree into `(key path, value)` pairs.
///
/// Nested maps extend the path with a dot. Arrays serialize per the
/// configured mode; under `ObjectPath` they are treated as index-keyed
/// maps and recurse like objects.
fn parametrize(params: &JsonMap, scope: &str, mode: ParamArrayType, out: &mut Vec<(String, String)>) {
    for (key, value) in params {
        let scoped = format!("{scope}{key}");
        match value {
            Value::Array(items) => match mode {
                ParamArrayType::CommaSeparated => {
                    let joined = items.iter().map(scalar).collect::<Vec<_>>().join(",");
                    out.push((scoped, joined));
                }
                ParamArrayType::MultipleParams => {
                    for item in items {
                        out.push((scoped.clone(), scalar(item)));
                    }
                }
                ParamArrayType::ParamArray => {
                    // The closing-bracket suffix lands inside the caller's
                    // `filter[..]` wrapper, producing `filter[key][]=`.
                    for item in items {
                        out.push((format!("{scoped}]["), scalar(item)));
                    }
                }
                ParamArrayType::ObjectPath => {
                    for (index, item) in items.iter().enumerate() {
                        nested(&format!("{scoped}.{index}"), item, mode, out);
                    }
                }
            },
            Value::Object(map) => parametrize(map, &format!("{scoped}."), mode, out),
            other => out.push((scoped, scalar(other))),
        }
    }
}

fn nested(path: &str, value: &Value, mode: ParamArrayType, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => parametrize(map, &format!("{path}."), mode, out),
        Value::Array(_) => {
            let mut wrapper = JsonMap::new();
            wrapper.insert(String::new(), value.clone());
            // Re-enter through a keyless wrapper so the index path stays
            // intact for arrays of arrays.
            let mut pairs = Vec::new();
            parametrize(&wrapper, "", mode, &mut pairs);
            out.extend(
                pairs
                    .into_iter()
                    .map(|(key, value)| (format!("{path}{key}"), value)),
            );
        }
        other => out.push((path.to_owned(), scalar(other))),
    }
}

/// Verbatim value text: strings as-is, everything else in JSON form.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
