//! Document normalization tests
//!
//! Feeding parsed documents through the client's sync path: upserts by
//! identity, included resources, relationship linking with key-sensitive
//! semantics, unknown-type fallback and error payloads.

use engram::RefValue;
use engram::jsonapi::Document;
use serde_json::json;

use super::helpers::*;
use crate::helpers::*;

fn document(value: serde_json::Value) -> Document {
    serde_json::from_value(value).expect("Failed to parse document")
}

#[test]
fn test_included_resources_link_to_primary_data() {
    let (client, _transport) = scripted_client();
    let models = client
        .sync(&document(json!({
            "data": {
                "type": "article",
                "id": "10",
                "attributes": { "title": "Hello" },
                "relationships": {
                    "author": { "data": { "type": "person", "id": "1" } },
                },
            },
            "included": [
                { "type": "person", "id": "1", "attributes": { "name": "Ada" } },
            ],
        })))
        .expect("Failed to sync");

    // Only primary resources are returned; included ones land in the
    // collection alongside them.
    assert_eq!(ids_of(&models), ["10"]);
    let collection = client.collection();
    assert_eq!(collection.len(), 2);

    let article = collection.find_one("article", "10").expect("Article missing");
    assert!(article.is_persisted().expect("Failed to read persisted"));
    let author = article
        .one("author")
        .expect("Failed to resolve author")
        .expect("Author missing");
    assert_eq!(author.get("name").expect("Failed to read name"), Some(json!("Ada")));
}

#[test]
fn test_refetched_resources_update_in_place() {
    let (client, _transport) = scripted_seeded_client();
    let collection = client.collection();
    let ada = collection.find_one("person", "1").expect("Person missing");

    let models = client
        .sync(&document(json!({
            "data": [
                { "type": "person", "id": "1", "attributes": { "name": "Ada Lovelace" } },
            ],
        })))
        .expect("Failed to sync");

    assert_eq!(models[0], ada);
    assert_eq!(collection.len(), 4);
    assert_eq!(
        ada.get("name").expect("Failed to read name"),
        Some(json!("Ada Lovelace"))
    );
}

#[test]
fn test_relationship_updates_are_key_sensitive() {
    let (client, _transport) = scripted_seeded_client();
    let collection = client.collection();
    let article = collection.find_one("article", "10").expect("Article missing");

    // No relationships key at all: references stay as they were.
    client
        .sync(&document(json!({
            "data": { "type": "article", "id": "10", "attributes": { "title": "Again" } },
        })))
        .expect("Failed to sync");
    assert!(article.one("author").expect("Failed to resolve").is_some());

    // An empty list cannot name its target type and is skipped, not
    // treated as a clear.
    client
        .sync(&document(json!({
            "data": {
                "type": "article",
                "id": "10",
                "relationships": { "comments": { "data": [] } },
            },
        })))
        .expect("Failed to sync");
    assert_eq!(ids_of(&article.many("comments").expect("Failed to resolve")), ["100"]);

    // An explicit null clears.
    client
        .sync(&document(json!({
            "data": {
                "type": "article",
                "id": "10",
                "relationships": { "author": { "data": null } },
            },
        })))
        .expect("Failed to sync");
    assert_eq!(article.one("author").expect("Failed to resolve"), None);
    assert_eq!(
        article.ref_value("author").expect("Failed to project"),
        RefValue::One(None)
    );
}

#[test]
fn test_relationships_replace_previous_contents() {
    let (client, _transport) = scripted_seeded_client();
    let collection = client.collection();
    let article = collection.find_one("article", "10").expect("Article missing");

    client
        .sync(&document(json!({
            "data": {
                "type": "article",
                "id": "10",
                "relationships": {
                    "author": { "data": { "type": "person", "id": "2" } },
                    "comments": { "data": [
                        { "type": "comment", "id": "101" },
                        { "type": "comment", "id": "100" },
                    ] },
                },
            },
        })))
        .expect("Failed to sync");

    let author = article
        .one("author")
        .expect("Failed to resolve author")
        .expect("Author missing");
    assert_eq!(author.id().expect("Failed to read id"), "2");

    // Comment 101 is not in the collection yet; the identifier is kept
    // and resolves later.
    assert_eq!(ids_of(&article.many("comments").expect("Failed to resolve")), ["100"]);
    match article.ref_value("comments").expect("Failed to project") {
        RefValue::Many(refs) => {
            assert_eq!(refs.len(), 2);
            assert_eq!(refs[0].id, "101");
            assert_eq!(refs[1].id, "100");
        }
        other => panic!("Expected a list projection, got {other:?}"),
    }
}

#[test]
fn test_unknown_types_fall_back_to_generic_models() {
    let (client, _transport) = scripted_client();
    let models = client
        .sync(&document(json!({
            "data": [{
                "type": "widget",
                "id": "9",
                "attributes": { "label": "Gear" },
                "relationships": {
                    "parent": { "data": { "type": "widget", "id": "8" } },
                    "owner": { "data": null },
                },
            }],
        })))
        .expect("Failed to sync");

    assert_eq!(ids_of(&models), ["9"]);
    let collection = client.collection();
    let widget = collection.find_one("widget", "9").expect("Widget missing");
    assert_eq!(widget.get("label").expect("Failed to read label"), Some(json!("Gear")));

    // The undeclared relationship got a runtime descriptor.
    assert_eq!(
        widget.ref_value("parent").expect("Failed to project"),
        RefValue::One(Some(engram::ModelRef::new("widget", "8")))
    );
    // Clearing a reference the model never had is a silent no-op.
    assert!(widget.ref_value("owner").is_err());
}

#[test]
fn test_undeclared_relationships_on_declared_types() {
    let (client, _transport) = scripted_seeded_client();
    let collection = client.collection();

    client
        .sync(&document(json!({
            "data": {
                "type": "article",
                "id": "10",
                "relationships": {
                    "reviewer": { "data": { "type": "person", "id": "2" } },
                },
            },
        })))
        .expect("Failed to sync");

    let article = collection.find_one("article", "10").expect("Article missing");
    let reviewer = article
        .one("reviewer")
        .expect("Failed to resolve reviewer")
        .expect("Reviewer missing");
    assert_eq!(reviewer.id().expect("Failed to read id"), "2");
}

#[test]
fn test_error_documents_reject_and_leave_the_collection_alone() {
    let (client, _transport) = scripted_seeded_client();
    let collection = client.collection();
    let article = collection.find_one("article", "10").expect("Article missing");

    let err = client
        .sync(&document(json!({
            "data": { "type": "article", "id": "10", "attributes": { "title": "Nope" } },
            "errors": [{ "status": "422", "title": "Invalid" }],
        })))
        .expect_err("Error documents must reject");

    assert!(err.is_rejection());
    assert!(err.is_network_error());
    assert_eq!(collection.len(), 4);
    assert_eq!(
        article.get("title").expect("Failed to read title"),
        Some(json!("Hello"))
    );
}

#[test]
fn test_resources_without_ids_get_generated_ones() {
    let (client, _transport) = scripted_client();
    let models = client
        .sync(&document(json!({
            "data": [{ "type": "person", "attributes": { "name": "Nameless" } }],
        })))
        .expect("Failed to sync");

    assert_eq!(ids_of(&models), ["-1"]);
    assert!(models[0].is_persisted().expect("Failed to read persisted"));
}
