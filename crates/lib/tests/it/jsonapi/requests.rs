//! Request shaping tests
//!
//! What the adapter actually puts on the wire: resolved paths, the
//! deterministic query grammar, array parameter modes, header layering
//! and base URL resolution for pagination links.

use engram::jsonapi::{Method, NetworkConfig, ParamArrayType, RequestOptions};
use serde_json::json;

use super::helpers::*;

fn empty_list() -> serde_json::Value {
    json!({ "data": [] })
}

#[tokio::test]
async fn test_paths_for_collections_and_single_resources() {
    let (client, transport) = scripted_client();
    transport.reply(200, empty_list()).reply(200, json!({ "data": null }));

    client
        .fetch_all("article", RequestOptions::new())
        .await
        .expect("Failed to fetch all");
    client
        .fetch("article", "12", RequestOptions::new())
        .await
        .expect("Failed to fetch one");

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[0].url, "/article");
    assert!(requests[0].body.is_none());
    assert_eq!(requests[1].url, "/article/12");
}

#[tokio::test]
async fn test_query_grammar_through_the_client() {
    let (client, transport) =
        scripted_client_with(NetworkConfig::new("https://api.example.com"));
    transport.reply(200, empty_list());

    client
        .fetch_all(
            "article",
            RequestOptions::new()
                .filter(json!({ "status": "published" }))
                .sort("-date")
                .include("author")
                .fields("article", ["title"])
                .param("page", "2"),
        )
        .await
        .expect("Failed to fetch");

    assert_eq!(
        transport.last_request().url,
        "https://api.example.com/article?filter[status]=published&sort=-date&include=author&fields[article]=title&page=2"
    );
}

#[tokio::test]
async fn test_array_mode_comes_from_the_config() {
    let (client, transport) = scripted_client_with(
        NetworkConfig::new("/").with_param_array_type(ParamArrayType::MultipleParams),
    );
    transport.reply(200, empty_list());

    client
        .fetch_all(
            "article",
            RequestOptions::new().filter(json!({ "tag": ["a", "b"] })),
        )
        .await
        .expect("Failed to fetch");

    assert_eq!(
        transport.last_request().url,
        "/article?filter[tag]=a&filter[tag]=b"
    );
}

#[tokio::test]
async fn test_headers_layer_config_then_request() {
    let (client, transport) = scripted_client_with(
        NetworkConfig::new("/")
            .with_header("authorization", "Bearer token")
            .with_header("x-stage", "config"),
    );
    transport.reply(200, empty_list());

    client
        .fetch_all(
            "article",
            RequestOptions::new().header("x-stage", "request").header("x-trace", "1"),
        )
        .await
        .expect("Failed to fetch");

    let headers = transport.last_request().headers;
    assert_eq!(headers["authorization"], "Bearer token");
    assert_eq!(headers["x-stage"], "request");
    assert_eq!(headers["x-trace"], "1");
    // GET requests carry no body and therefore no content type.
    assert!(!headers.contains_key("content-type"));
}

#[tokio::test]
async fn test_bodied_requests_default_the_media_type() {
    let (client, transport) = scripted_seeded_client();
    transport.reply(200, json!({ "data": null }));

    let article = client
        .collection()
        .find_one("article", "10")
        .expect("Article missing");
    client
        .save(&article, RequestOptions::new())
        .await
        .expect("Failed to save");

    let request = transport.last_request();
    assert_eq!(request.headers["content-type"], "application/vnd.api+json");
    assert!(request.body.is_some());
}

#[tokio::test]
async fn test_fetch_url_resolves_relative_links_against_the_base() {
    let (client, transport) =
        scripted_client_with(NetworkConfig::new("https://api.example.com"));
    transport.reply(200, empty_list()).reply(200, empty_list());

    client
        .fetch_url("article?page=2", RequestOptions::new())
        .await
        .expect("Failed to fetch relative");
    client
        .fetch_url("https://other.example.com/article", RequestOptions::new())
        .await
        .expect("Failed to fetch absolute");

    let requests = transport.requests();
    assert_eq!(requests[0].url, "https://api.example.com/article?page=2");
    // Absolute links, pagination answers included, bypass the base.
    assert_eq!(requests[1].url, "https://other.example.com/article");
}

#[tokio::test]
async fn test_request_passes_method_and_body_through() {
    let (client, transport) = scripted_client();
    transport.reply(200, empty_list());

    client
        .request(
            "article/7/activate",
            Method::Post,
            Some(engram::jsonapi::Document::default()),
            RequestOptions::new(),
        )
        .await
        .expect("Failed to post");

    let request = transport.last_request();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.url, "/article/7/activate");
    assert_eq!(request.json(), json!({}));
}
