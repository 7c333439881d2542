//! Helper functions for network adapter testing
//!
//! Provides a scripted transport that records every request and replays
//! canned responses, plus client factories over the blog fixtures.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use engram::jsonapi::{
    JsonApiClient, Method, NetworkConfig, NetworkError, RawResponse, Transport,
};
use serde_json::Value;

use crate::helpers::*;

// ===== SCRIPTED TRANSPORT =====

/// One request exactly as the transport saw it.
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl SeenRequest {
    /// The request body parsed as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(self.body.as_deref().expect("Request has no body"))
            .expect("Request body is not JSON")
    }
}

#[derive(Default)]
struct MockState {
    responses: Mutex<VecDeque<RawResponse>>,
    requests: Mutex<Vec<SeenRequest>>,
}

/// Transport that replays canned responses in order and records every
/// request. Clones share state, so a clone kept by the test still sees
/// requests after the client consumed the original.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport::default()
    }

    /// Queues a JSON response.
    pub fn reply(&self, status: u16, body: Value) -> &Self {
        self.push(RawResponse {
            status,
            headers: BTreeMap::new(),
            body: Some(body.to_string()),
        });
        self
    }

    /// Queues a bodyless response, the shape of `204 No Content`.
    pub fn reply_empty(&self, status: u16) -> &Self {
        self.push(RawResponse {
            status,
            headers: BTreeMap::new(),
            body: None,
        });
        self
    }

    /// Queues a response with a verbatim body.
    pub fn reply_text(&self, status: u16, body: &str) -> &Self {
        self.push(RawResponse {
            status,
            headers: BTreeMap::new(),
            body: Some(body.to_owned()),
        });
        self
    }

    /// Queues a response with extra headers.
    pub fn reply_with_headers(
        &self,
        status: u16,
        headers: &[(&str, &str)],
        body: Value,
    ) -> &Self {
        self.push(RawResponse {
            status,
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
            body: Some(body.to_string()),
        });
        self
    }

    fn push(&self, response: RawResponse) {
        self.state.responses.lock().unwrap().push_back(response);
    }

    /// All recorded requests, in order.
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> SeenRequest {
        self.requests().pop().expect("No request was recorded")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<String>,
    ) -> Result<RawResponse, NetworkError> {
        self.state.requests.lock().unwrap().push(SeenRequest {
            method,
            url: url.to_owned(),
            headers: headers.clone(),
            body,
        });
        self.state
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(NetworkError::Transport {
                reason: "no scripted response left".to_owned(),
            })
    }
}

// ===== CLIENT FACTORIES =====

/// Client over an empty blog collection with the default config.
pub fn scripted_client() -> (JsonApiClient, MockTransport) {
    scripted_client_with(NetworkConfig::default())
}

/// Client over an empty blog collection with a caller-supplied config.
pub fn scripted_client_with(config: NetworkConfig) -> (JsonApiClient, MockTransport) {
    let transport = MockTransport::new();
    let client = JsonApiClient::with_transport(blog_collection(), config, transport.clone());
    (client, transport)
}

/// Client over the seeded blog collection.
pub fn scripted_seeded_client() -> (JsonApiClient, MockTransport) {
    let transport = MockTransport::new();
    let client = JsonApiClient::with_transport(
        seeded_collection(),
        NetworkConfig::default(),
        transport.clone(),
    );
    (client, transport)
}
