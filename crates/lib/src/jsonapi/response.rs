//! Resolved result of one network call.

use std::collections::BTreeMap;

use crate::JsonMap;
use crate::model::Model;

use super::document::Link;

/// A completed request: the models normalized into the collection plus
/// the document's metadata, pagination links and response headers.
///
/// Pagination is driven by the link accessors together with
/// [`JsonApiClient::fetch_url`](super::JsonApiClient::fetch_url): feed
/// [`Self::next_link`] back into the client to walk pages.
#[derive(Clone, Debug)]
pub struct Response {
    status: u16,
    models: Vec<Model>,
    meta: JsonMap,
    links: BTreeMap<String, Link>,
    headers: BTreeMap<String, String>,
}

impl Response {
    pub(crate) fn new(
        status: u16,
        models: Vec<Model>,
        meta: JsonMap,
        links: BTreeMap<String, Link>,
        headers: BTreeMap<String, String>,
    ) -> Response {
        Response {
            status,
            models,
            meta,
            links,
            headers,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// The primary models, in document order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn into_models(self) -> Vec<Model> {
        self.models
    }

    /// The first primary model, for single-resource calls.
    pub fn first(&self) -> Option<&Model> {
        self.models.first()
    }

    pub fn meta(&self) -> &JsonMap {
        &self.meta
    }

    pub fn links(&self) -> &BTreeMap<String, Link> {
        &self.links
    }

    /// A named link's URL.
    pub fn link(&self, name: &str) -> Option<&str> {
        self.links.get(name).map(Link::href)
    }

    pub fn next_link(&self) -> Option<&str> {
        self.link("next")
    }

    pub fn prev_link(&self) -> Option<&str> {
        self.link("prev")
    }

    pub fn first_link(&self) -> Option<&str> {
        self.link("first")
    }

    pub fn last_link(&self) -> Option<&str> {
        self.link("last")
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}
