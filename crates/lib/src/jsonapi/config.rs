//! Per-client request configuration.

use std::collections::BTreeMap;

/// How array values are serialized into query parameters.
///
/// Given `filter: {tag: [a, b]}`:
///
/// - `CommaSeparated` produces `filter[tag]=a,b`
/// - `MultipleParams` produces `filter[tag]=a&filter[tag]=b`
/// - `ParamArray` produces `filter[tag][]=a&filter[tag][]=b`
/// - `ObjectPath` produces `filter[tag.0]=a&filter[tag.1]=b`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParamArrayType {
    #[default]
    CommaSeparated,
    MultipleParams,
    ParamArray,
    ObjectPath,
}

/// Settings shared by every request a client makes: the URL prefix, the
/// array serialization style and headers applied to each call.
///
/// Built once and handed to [`JsonApiClient`](super::JsonApiClient), which
/// keeps it behind an `Arc`; per-request options can add or override
/// headers but never mutate the shared config.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    base_url: String,
    param_array_type: ParamArrayType,
    headers: BTreeMap<String, String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            base_url: "/".to_owned(),
            param_array_type: ParamArrayType::default(),
            headers: BTreeMap::new(),
        }
    }
}

impl NetworkConfig {
    pub fn new(base_url: impl Into<String>) -> NetworkConfig {
        NetworkConfig {
            base_url: base_url.into(),
            ..NetworkConfig::default()
        }
    }

    pub fn with_param_array_type(mut self, param_array_type: ParamArrayType) -> Self {
        self.param_array_type = param_array_type;
        self
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn param_array_type(&self) -> ParamArrayType {
        self.param_array_type
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}
