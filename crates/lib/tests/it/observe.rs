//! Patch subscription integration tests
//!
//! One logical mutation, one patch: listeners on a model and on its
//! owning collection both see updates, creates and removes, with old and
//! new values carried on the patch itself.

use engram::PatchType;
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_update_patch_carries_only_changed_fields() {
    let collection = seeded_collection();
    let article = collection.find_one("article", "10").expect("Article missing");
    let log = PatchLog::new();
    article.subscribe(log.listener()).expect("Failed to subscribe");

    article.set("title", json!("Renamed")).expect("Failed to set title");

    let patches = log.take();
    assert_eq!(patches.len(), 1);
    let patch = &patches[0];
    assert_eq!(patch.patch_type, PatchType::Update);
    assert_eq!(patch.model_type, "article");
    assert_eq!(patch.model_id, "10");

    let old = patch.old_value.as_ref().expect("Update must carry old values");
    let new = patch.new_value.as_ref().expect("Update must carry new values");
    assert_eq!(old.len(), 1);
    assert_eq!(old["title"], json!("Hello"));
    assert_eq!(new.len(), 1);
    assert_eq!(new["title"], json!("Renamed"));
}

#[test]
fn test_update_batches_fields_into_one_patch() {
    let collection = seeded_collection();
    let article = collection.find_one("article", "10").expect("Article missing");
    let log = PatchLog::new();
    article.subscribe(log.listener()).expect("Failed to subscribe");

    article
        .update(json!({ "title": "Renamed", "status": "published" }))
        .expect("Failed to update");

    let patches = log.take();
    assert_eq!(patches.len(), 1);
    let new = patches[0].new_value.as_ref().expect("Update must carry new values");
    assert_eq!(new["title"], json!("Renamed"));
    assert_eq!(new["status"], json!("published"));
}

#[test]
fn test_unchanged_writes_are_silent() {
    let collection = seeded_collection();
    let article = collection.find_one("article", "10").expect("Article missing");
    let log = PatchLog::new();
    article.subscribe(log.listener()).expect("Failed to subscribe");

    article.set("title", json!("Hello")).expect("Failed to set title");

    assert!(log.is_empty());
}

#[test]
fn test_reference_patches_use_identifier_form() {
    let collection = seeded_collection();
    let article = collection.find_one("article", "10").expect("Article missing");
    let log = PatchLog::new();
    article.subscribe(log.listener()).expect("Failed to subscribe");

    article.set("author", json!("2")).expect("Failed to set author");

    let patches = log.take();
    assert_eq!(patches.len(), 1);
    let old = patches[0].old_value.as_ref().expect("Update must carry old values");
    let new = patches[0].new_value.as_ref().expect("Update must carry new values");
    assert_eq!(old["author"], json!({ "type": "person", "id": "1" }));
    assert_eq!(new["author"], json!({ "type": "person", "id": "2" }));
}

#[test]
fn test_collection_listeners_see_member_lifecycle() {
    let collection = blog_collection();
    let log = PatchLog::new();
    collection.subscribe(log.listener());

    let ada = collection
        .add_raw("person", json!({ "id": "1", "name": "Ada" }))
        .expect("Failed to add person");
    ada.set("name", json!("Ada L.")).expect("Failed to set name");
    collection.remove_model(&ada).expect("Failed to remove person");

    let patches = log.take();
    assert_eq!(patches.len(), 3);

    assert_eq!(patches[0].patch_type, PatchType::Create);
    assert!(patches[0].old_value.is_none());
    let created = patches[0].new_value.as_ref().expect("Create must carry the model");
    assert_eq!(created["name"], json!("Ada"));
    assert!(created.contains_key("__meta__"));

    assert_eq!(patches[1].patch_type, PatchType::Update);

    assert_eq!(patches[2].patch_type, PatchType::Remove);
    assert!(patches[2].new_value.is_none());
    let removed = patches[2].old_value.as_ref().expect("Remove must carry the model");
    assert_eq!(removed["name"], json!("Ada L."));
}

#[test]
fn test_removal_notifies_referrers_of_the_scrub() {
    let collection = seeded_collection();
    let article = collection.find_one("article", "10").expect("Article missing");
    let log = PatchLog::new();
    article.subscribe(log.listener()).expect("Failed to subscribe");

    collection.remove("person", "1").expect("Failed to remove person");

    let patches = log.take();
    assert_eq!(patches.len(), 1);
    let patch = &patches[0];
    assert_eq!(patch.patch_type, PatchType::Update);
    assert_eq!(patch.model_type, "article");
    let old = patch.old_value.as_ref().expect("Scrub must carry old values");
    let new = patch.new_value.as_ref().expect("Scrub must carry new values");
    assert_eq!(old["author"], json!({ "type": "person", "id": "1" }));
    assert_eq!(new["author"], json!(null));
}

#[test]
fn test_unsubscribe_is_effective_and_idempotent() {
    let collection = seeded_collection();
    let article = collection.find_one("article", "10").expect("Article missing");

    let model_log = PatchLog::new();
    let id = article.subscribe(model_log.listener()).expect("Failed to subscribe");
    let collection_log = PatchLog::new();
    let collection_id = collection.subscribe(collection_log.listener());

    assert!(article.unsubscribe(id).expect("Failed to unsubscribe"));
    assert!(!article.unsubscribe(id).expect("Failed to re-unsubscribe"));
    assert!(collection.unsubscribe(collection_id));
    assert!(!collection.unsubscribe(collection_id));

    article.set("title", json!("Silent")).expect("Failed to set title");
    assert!(model_log.is_empty());
    assert!(collection_log.is_empty());
}

#[test]
fn test_listeners_may_reenter_the_store() {
    let collection = seeded_collection();
    let article = collection.find_one("article", "10").expect("Article missing");

    // Patches are dispatched after all locks are released, so a listener
    // may query the collection it observes.
    let inner = collection.clone();
    let seen = std::sync::Arc::new(std::sync::Mutex::new(0));
    let count = std::sync::Arc::clone(&seen);
    article
        .subscribe(move |patch| {
            assert!(inner.find_one("article", patch.model_id.clone()).is_some());
            *count.lock().unwrap() += 1;
        })
        .expect("Failed to subscribe");

    article.set("title", json!("Reentrant")).expect("Failed to set title");
    assert_eq!(*seen.lock().unwrap(), 1);
}
