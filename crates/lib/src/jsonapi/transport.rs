//! Pluggable HTTP transport.
//!
//! The adapter talks to the network through the [`Transport`] trait so
//! tests can substitute a scripted implementation; [`HttpTransport`] is
//! the real one, a thin layer over `reqwest`.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use super::document::Document;
use super::errors::NetworkError;

/// Request methods the adapter issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level response, before any document parsing.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as a document. An empty body is an empty document,
    /// the shape of `204 No Content` answers.
    ///
    /// # Errors
    ///
    /// [`NetworkError::Document`] when a body is present but unparseable.
    pub fn document(&self) -> Result<Document, NetworkError> {
        match &self.body {
            Some(body) if !body.trim().is_empty() => {
                serde_json::from_str(body).map_err(|e| NetworkError::Document {
                    reason: e.to_string(),
                })
            }
            _ => Ok(Document::default()),
        }
    }
}

/// One HTTP exchange.
///
/// Implementations only move bytes; status interpretation and document
/// errors belong to the client layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<String>,
    ) -> Result<RawResponse, NetworkError>;
}

/// Transport over a shared [`reqwest::Client`].
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> HttpTransport {
        HttpTransport::default()
    }

    /// Wraps a preconfigured client, for connection pools or TLS setup
    /// owned by the caller.
    pub fn with_client(client: reqwest::Client) -> HttpTransport {
        HttpTransport { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<String>,
    ) -> Result<RawResponse, NetworkError> {
        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| NetworkError::Transport {
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let mut response_headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.insert(name.as_str().to_owned(), value.to_owned());
            }
        }
        let body = response.text().await.map_err(|e| NetworkError::Transport {
            reason: e.to_string(),
        })?;

        Ok(RawResponse {
            status,
            headers: response_headers,
            body: (!body.is_empty()).then_some(body),
        })
    }
}
