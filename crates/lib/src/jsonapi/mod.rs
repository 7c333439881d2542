//! JSON:API network adapter.
//!
//! Wraps a [`Collection`](crate::Collection) with fetch/save/destroy
//! operations against a JSON:API backend. Responses are normalized
//! through the collection's own add/update paths, so remote data and
//! local mutation are indistinguishable to subscribers; requests are
//! built with a deterministic URL grammar and dispatched through a
//! pluggable [`Transport`].
//!
//! The module is behind the `jsonapi` feature, on by default.

mod client;
mod config;
mod document;
mod errors;
mod response;
mod transport;
mod url;

pub use client::{FetchMode, JsonApiClient};
pub use config::{NetworkConfig, ParamArrayType};
pub use document::{
    Document, ErrorObject, ErrorSource, Link, PrimaryData, Relationship, Resource,
};
pub use errors::NetworkError;
pub use response::Response;
pub use transport::{HttpTransport, Method, RawResponse, Transport};
pub use url::{QueryPair, RequestOptions, build_url};
