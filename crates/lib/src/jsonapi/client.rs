//! JSON:API client over a collection.
//!
//! The client owns no model state. Every response is normalized straight
//! into the collection it wraps, so fetched data flows through the same
//! add/update/remove paths as local mutation and reaches the same
//! subscribers. Requests suspend only at the transport boundary; all
//! collection work happens synchronously once the response arrives.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::bucket::{RefInput, RefValue};
use crate::collection::Collection;
use crate::model::{Model, ModelId, ModelRef};
use crate::snapshot::RefKind;
use crate::view::View;

use super::config::NetworkConfig;
use super::document::{Document, PrimaryData, Relationship, Resource};
use super::errors::NetworkError;
use super::response::Response;
use super::transport::{HttpTransport, Method, RawResponse, Transport};
use super::url::{RequestOptions, prepare_query, resolve_base};

/// JSON:API media type, set on request bodies.
const MEDIA_TYPE: &str = "application/vnd.api+json";

/// What a view-targeted fetch does with the view's current contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMode {
    /// Paged navigation: the view mirrors the fetched page.
    Replace,
    /// Infinite scrolling: fetched models extend the view.
    Append,
}

/// Client tying a [`Collection`] to a JSON:API backend.
pub struct JsonApiClient {
    collection: Collection,
    config: Arc<NetworkConfig>,
    transport: Arc<dyn Transport>,
}

impl JsonApiClient {
    /// Creates a client over the real HTTP transport.
    pub fn new(collection: Collection, config: NetworkConfig) -> JsonApiClient {
        JsonApiClient::with_transport(collection, config, HttpTransport::new())
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(
        collection: Collection,
        config: NetworkConfig,
        transport: impl Transport + 'static,
    ) -> JsonApiClient {
        JsonApiClient {
            collection,
            config: Arc::new(config),
            transport: Arc::new(transport),
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Fetches a single resource and normalizes it into the collection.
    pub async fn fetch(
        &self,
        type_name: &str,
        id: impl Into<ModelId>,
        options: RequestOptions,
    ) -> crate::Result<Response> {
        let id = id.into();
        let url = prepare_query(
            type_name,
            Some(&id),
            &options,
            self.collection.registry(),
            &self.config,
        );
        self.run(Method::Get, url, None, options).await
    }

    /// Fetches a resource collection.
    pub async fn fetch_all(
        &self,
        type_name: &str,
        options: RequestOptions,
    ) -> crate::Result<Response> {
        let url = prepare_query(
            type_name,
            None,
            &options,
            self.collection.registry(),
            &self.config,
        );
        self.run(Method::Get, url, None, options).await
    }

    /// Fetches the view's type and routes the result into the view:
    /// [`FetchMode::Replace`] for paged navigation,
    /// [`FetchMode::Append`] for infinite accumulation. The mode is the
    /// caller's call, never the view's.
    pub async fn fetch_into(
        &self,
        view: &View,
        mode: FetchMode,
        options: RequestOptions,
    ) -> crate::Result<Response> {
        let type_name = view.model_type()?;
        let response = self.fetch_all(&type_name, options).await?;
        if mode == FetchMode::Replace {
            view.remove_all()?;
        }
        for model in response.models() {
            view.add(model)?;
        }
        Ok(response)
    }

    /// GET against an explicit URL, typically a pagination link. Relative
    /// URLs get the configured base prefix; absolute ones pass through.
    pub async fn fetch_url(&self, url: &str, options: RequestOptions) -> crate::Result<Response> {
        let url = resolve_base(url, &self.config);
        self.run(Method::Get, url, None, options).await
    }

    /// Raw passthrough: any method, any URL, an optional prebuilt
    /// document body, full normalization of the answer.
    pub async fn request(
        &self,
        url: &str,
        method: Method,
        body: Option<Document>,
        options: RequestOptions,
    ) -> crate::Result<Response> {
        let url = resolve_base(url, &self.config);
        self.run(method, url, body, options).await
    }

    /// Persists one model.
    ///
    /// Unpersisted models POST to the type path, with the local id
    /// included only when the schema opts into sending generated ids;
    /// persisted models PATCH their resource path. A server-assigned id
    /// in the answer is adopted in place, so identifier references keep
    /// resolving, and the model is marked persisted.
    pub async fn save(&self, model: &Model, options: RequestOptions) -> crate::Result<Response> {
        if !self.collection.has_item(model) {
            self.collection.add(model)?;
        }
        let r = model.to_ref()?;
        let persisted = model.is_persisted()?;
        let body = Document::with_resource(self.to_resource(model, &r, persisted)?);
        let registry = self.collection.registry();
        let (method, url) = if persisted {
            (
                Method::Patch,
                prepare_query(&r.type_name, Some(&r.id), &options, registry, &self.config),
            )
        } else {
            (
                Method::Post,
                prepare_query(&r.type_name, None, &options, registry, &self.config),
            )
        };

        let (raw, document) = self.exchange(method, url, Some(body), &options).await?;

        if let Some(PrimaryData::One(resource)) = &document.data
            && let Some(server_id) = resource.id.clone()
            && !server_id.is_empty()
            && server_id != r.id
        {
            debug!(model = %r, %server_id, "Adopting server-assigned id");
            self.collection
                .change_model_id(&r.type_name, &r.id, server_id)?;
        }

        let mut models = self.sync(&document)?;
        self.collection.arena().set_persisted(model.key(), true)?;
        if models.is_empty() {
            models.push(model.clone());
        }
        let Document { meta, links, .. } = document;
        Ok(Response::new(raw.status, models, meta, links, raw.headers))
    }

    /// Deletes one model: DELETE on the backend when it was ever
    /// persisted, then local removal (with reference scrubbing) either
    /// way.
    pub async fn destroy(&self, model: &Model, options: RequestOptions) -> crate::Result<()> {
        let r = model.to_ref()?;
        if model.is_persisted()? {
            let url = prepare_query(
                &r.type_name,
                Some(&r.id),
                &options,
                self.collection.registry(),
                &self.config,
            );
            self.exchange(Method::Delete, url, None, &options).await?;
        }
        if self.collection.has_item(model) {
            self.collection.remove_model(model)?;
        }
        Ok(())
    }

    /// Normalizes a document into the collection and returns the primary
    /// models.
    ///
    /// Two passes. The first upserts every resource, `included` before
    /// `data`: a matching `(type, id)` updates in place, a declared type
    /// constructs through its schema, an unknown type falls back to a
    /// generic model so nothing is dropped. The second pass links
    /// relationships; identifiers resolve to models already in the
    /// collection, or stay bare references that resolve later.
    ///
    /// Relationship handling is key-sensitive: an absent `data` key is
    /// skipped, an explicit `null` clears the local reference, and an
    /// empty list is skipped rather than treated as a clear, because an
    /// empty list cannot name its target type.
    ///
    /// # Errors
    ///
    /// [`NetworkError::Api`] when the document carries an error payload;
    /// the collection is untouched in that case.
    pub fn sync(&self, document: &Document) -> crate::Result<Vec<Model>> {
        if document.has_errors() {
            return Err(NetworkError::Api {
                errors: document.error_objects(),
            }
            .into());
        }

        let mut upserted: Vec<(Model, &Resource)> = Vec::new();
        for resource in &document.included {
            upserted.push((self.upsert(resource)?, resource));
        }
        let mut primary = Vec::new();
        for resource in document.primary_resources() {
            let model = self.upsert(resource)?;
            upserted.push((model.clone(), resource));
            primary.push(model);
        }

        for (model, resource) in &upserted {
            self.link_relationships(model, resource)?;
        }

        trace!(
            primary = primary.len(),
            included = document.included.len(),
            "Document normalized"
        );
        Ok(primary)
    }

    fn upsert(&self, resource: &Resource) -> crate::Result<Model> {
        self.collection.upsert_wire(
            &resource.type_name,
            resource.id.clone().filter(|id| !id.is_empty()),
            resource.attributes.clone(),
        )
    }

    fn link_relationships(&self, model: &Model, resource: &Resource) -> crate::Result<()> {
        for (field, relationship) in &resource.relationships {
            let Some(data) = &relationship.data else {
                continue;
            };
            if let RefValue::Many(refs) = data
                && refs.is_empty()
            {
                continue;
            }
            self.assign_relationship(model, field, data)?;
        }
        Ok(())
    }

    /// Routes one relationship value through the model's bucket,
    /// initializing a descriptor on the fly for undeclared fields.
    fn assign_relationship(
        &self,
        model: &Model,
        field: &str,
        data: &RefValue,
    ) -> crate::Result<()> {
        let target = match data {
            RefValue::One(Some(r)) => Some(r.type_name.clone()),
            RefValue::Many(refs) => refs.first().map(|r| r.type_name.clone()),
            RefValue::One(None) => None,
        };
        let arena = self.collection.arena();
        if arena.bucket_of(model.key(), field).is_err() {
            let Some(target) = target else {
                // Clearing a reference the model never had.
                return Ok(());
            };
            arena.init_runtime_ref(model.key(), field, RefKind::OneOrMany, &target)?;
        }

        match data {
            RefValue::One(one) => {
                model.set_one(field, one.clone().map(|r| self.resolve_input(r)))?;
            }
            RefValue::Many(refs) => {
                let inputs = refs
                    .iter()
                    .map(|r| self.resolve_input(r.clone()))
                    .collect();
                model.set_many(field, inputs)?;
            }
        }
        Ok(())
    }

    /// An identifier becomes the live model when the collection already
    /// holds it, a bare reference otherwise.
    fn resolve_input(&self, r: ModelRef) -> RefInput {
        match self.collection.find_ref(&r) {
            Some(model) => RefInput::from(model),
            None => RefInput::from(r),
        }
    }

    fn to_resource(&self, model: &Model, r: &ModelRef, persisted: bool) -> crate::Result<Resource> {
        let schema = model.schema()?;
        let mut resource = Resource::new(r.type_name.clone());
        if persisted || schema.send_auto_id() {
            resource.id = Some(r.id.clone());
        }
        resource.attributes = model.attributes()?;
        for (field, value) in self.collection.arena().ref_values(model.key())? {
            resource
                .relationships
                .insert(field, Relationship::with_data(value));
        }
        Ok(resource)
    }

    async fn run(
        &self,
        method: Method,
        url: String,
        body: Option<Document>,
        options: RequestOptions,
    ) -> crate::Result<Response> {
        let (raw, document) = self.exchange(method, url, body, &options).await?;
        let models = self.sync(&document)?;
        let Document { meta, links, .. } = document;
        Ok(Response::new(raw.status, models, meta, links, raw.headers))
    }

    /// Sends one request and applies the error funnel: transport errors,
    /// then non-success statuses, then document error payloads. A
    /// document only reaches normalization after clearing all three.
    async fn exchange(
        &self,
        method: Method,
        url: String,
        body: Option<Document>,
        options: &RequestOptions,
    ) -> crate::Result<(RawResponse, Document)> {
        let mut headers = self.config.headers().clone();
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }
        let body = match body {
            Some(document) => {
                headers
                    .entry("content-type".to_owned())
                    .or_insert_with(|| MEDIA_TYPE.to_owned());
                Some(serde_json::to_string(&document)?)
            }
            None => None,
        };

        debug!(%method, %url, "Request dispatched");
        let raw = self
            .transport
            .request(method, &url, &headers, body)
            .await
            .map_err(crate::Error::from)?;
        let document = raw.document().map_err(crate::Error::from)?;

        if !raw.is_success() {
            warn!(status = raw.status, %url, "Request failed");
            return Err(NetworkError::Http {
                status: raw.status,
                errors: document.error_objects(),
            }
            .into());
        }
        if document.has_errors() {
            warn!(%url, "Response document carries errors");
            return Err(NetworkError::Api {
                errors: document.error_objects(),
            }
            .into());
        }
        Ok((raw, document))
    }
}
