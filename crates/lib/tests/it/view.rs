//! View integration tests
//!
//! Ordered projections: stored order, unique re-add semantics, live
//! field sorting, comparator sorting, and cleanup when members leave the
//! collection.

use engram::{Collection, Model, ModelRef, ViewOptions};
use serde_json::json;

use crate::helpers::*;

fn article(collection: &Collection, id: &str, title: &str) -> Model {
    collection
        .add_raw("article", json!({ "id": id, "title": title }))
        .expect("Failed to add article")
}

#[test]
fn test_unique_views_move_readds_to_the_end() {
    let collection = blog_collection();
    let a = article(&collection, "1", "A");
    let b = article(&collection, "2", "B");
    let view = collection
        .add_view("queue", "article", ViewOptions::new().unique())
        .expect("Failed to add view");

    view.add(&a).expect("Failed to add A");
    view.add(&b).expect("Failed to add B");
    view.add(&a).expect("Failed to re-add A");

    assert_eq!(view.ids().expect("Failed to read ids"), ["2", "1"]);
    assert_eq!(view.len().expect("Failed to read len"), 2);
    assert!(view.is_unique().expect("Failed to read uniqueness"));
}

#[test]
fn test_plain_views_allow_duplicates() {
    let collection = blog_collection();
    let a = article(&collection, "1", "A");
    let view = collection
        .add_view("log", "article", ViewOptions::new())
        .expect("Failed to add view");

    view.add(&a).expect("Failed to add");
    view.add(&a).expect("Failed to add again");

    assert_eq!(view.ids().expect("Failed to read ids"), ["1", "1"]);
    assert_eq!(ids_of(&view.list().expect("Failed to list")), ["1", "1"]);
}

#[test]
fn test_field_sort_reflects_live_values() {
    let collection = blog_collection();
    let c = article(&collection, "1", "Cherry");
    let a = article(&collection, "2", "Apple");
    let b = article(&collection, "3", "Banana");
    let view = collection
        .add_view("alphabetical", "article", ViewOptions::new().sort_by("title"))
        .expect("Failed to add view");
    for model in [&c, &a, &b] {
        view.add(model).expect("Failed to add");
    }

    assert_eq!(ids_of(&view.list().expect("Failed to list")), ["2", "3", "1"]);
    // Stored order is untouched by sorting.
    assert_eq!(view.ids().expect("Failed to read ids"), ["1", "2", "3"]);

    // Sorting reads current values: renaming re-orders the next list call.
    c.set("title", json!("Apricot")).expect("Failed to rename");
    assert_eq!(ids_of(&view.list().expect("Failed to list")), ["2", "1", "3"]);
}

#[test]
fn test_missing_sort_values_come_first() {
    let collection = blog_collection();
    let dated = collection
        .add_raw("article", json!({ "id": "1", "title": "A", "date": "2024-01-01" }))
        .expect("Failed to add article");
    let undated = article(&collection, "2", "B");
    let view = collection
        .add_view("timeline", "article", ViewOptions::new().sort_by("date"))
        .expect("Failed to add view");
    view.add(&dated).expect("Failed to add");
    view.add(&undated).expect("Failed to add");

    assert_eq!(ids_of(&view.list().expect("Failed to list")), ["2", "1"]);
}

#[test]
fn test_comparator_sorts_run_on_every_list() {
    let collection = blog_collection();
    for (id, title) in [("1", "A"), ("2", "B"), ("3", "C")] {
        article(&collection, id, title);
    }
    let view = collection
        .add_view(
            "reversed",
            "article",
            ViewOptions::new().sort_with(|a, b| {
                let left = a.get("title").expect("title").unwrap_or_default();
                let right = b.get("title").expect("title").unwrap_or_default();
                right.to_string().cmp(&left.to_string())
            }),
        )
        .expect("Failed to add view");
    for model in collection.find_all("article") {
        view.add(&model).expect("Failed to add");
    }

    assert_eq!(ids_of(&view.list().expect("Failed to list")), ["3", "2", "1"]);
}

#[test]
fn test_views_are_type_checked() {
    let collection = seeded_collection();
    let view = collection
        .add_view("articles_only", "article", ViewOptions::new())
        .expect("Failed to add view");

    let person = collection.find_one("person", "1").expect("Person missing");
    let err = view.add(&person).expect_err("Wrong type must be rejected");
    assert_eq!(err.module(), "collection");

    let err = view
        .add_ref(&ModelRef::new("person", "1"))
        .expect_err("Wrong ref type must be rejected");
    assert_eq!(err.module(), "collection");
    assert_eq!(view.model_type().expect("Failed to read type"), "article");
}

#[test]
fn test_view_names_are_unique() {
    let collection = blog_collection();
    collection
        .add_view("queue", "article", ViewOptions::new())
        .expect("Failed to add view");
    let err = collection
        .add_view("queue", "article", ViewOptions::new())
        .expect_err("Name collision must fail");
    assert!(err.is_name_taken());
    assert_eq!(collection.view_names(), ["queue"]);
}

#[test]
fn test_member_removal_drops_view_entries() {
    let collection = blog_collection();
    let a = article(&collection, "1", "A");
    let b = article(&collection, "2", "B");
    let view = collection
        .add_view("queue", "article", ViewOptions::new())
        .expect("Failed to add view");
    view.add(&a).expect("Failed to add");
    view.add(&b).expect("Failed to add");

    collection.remove_model(&a).expect("Failed to remove");

    assert_eq!(view.ids().expect("Failed to read ids"), ["2"]);
    assert!(!view.has_item(&a).expect("Failed to check membership"));
    assert!(view.has_item(&b).expect("Failed to check membership"));
}

#[test]
fn test_unresolved_refs_are_tracked_but_not_listed() {
    let collection = blog_collection();
    let view = collection
        .add_view("queue", "article", ViewOptions::new())
        .expect("Failed to add view");

    view.add_ref(&ModelRef::new("article", "99")).expect("Failed to add ref");
    assert_eq!(view.ids().expect("Failed to read ids"), ["99"]);
    assert!(view.list().expect("Failed to list").is_empty());

    // Once the model exists the same entry resolves.
    article(&collection, "99", "Late");
    assert_eq!(ids_of(&view.list().expect("Failed to list")), ["99"]);
}

#[test]
fn test_view_add_inserts_free_models_into_the_collection() {
    let collection = blog_collection();
    let view = collection
        .add_view("queue", "article", ViewOptions::new())
        .expect("Failed to add view");

    let free = collection
        .arena()
        .create(
            &collection.registry().schema("article").expect("Schema missing"),
            json!({ "id": "5", "title": "Free" }),
        )
        .expect("Failed to create model");
    assert!(!collection.has_item(&free));

    view.add(&free).expect("Failed to add");
    assert!(collection.has_item(&free));
    assert_eq!(view.ids().expect("Failed to read ids"), ["5"]);
}

#[test]
fn test_remove_and_remove_all() {
    let collection = blog_collection();
    let a = article(&collection, "1", "A");
    let b = article(&collection, "2", "B");
    let view = collection
        .add_view("queue", "article", ViewOptions::new())
        .expect("Failed to add view");
    view.add(&a).expect("Failed to add");
    view.add(&b).expect("Failed to add");

    view.remove(&a).expect("Failed to remove");
    assert_eq!(view.ids().expect("Failed to read ids"), ["2"]);
    // The collection itself is untouched.
    assert!(collection.has_item(&a));

    view.remove_all().expect("Failed to clear");
    assert!(view.is_empty().expect("Failed to check emptiness"));
    assert_eq!(collection.len(), 2);
}

#[test]
fn test_views_may_be_seeded_with_ids() {
    let collection = blog_collection();
    article(&collection, "1", "A");
    article(&collection, "2", "B");
    let view = collection
        .add_view(
            "seeded",
            "article",
            ViewOptions::new().models(vec!["2".into(), "1".into()]),
        )
        .expect("Failed to add view");

    assert_eq!(view.ids().expect("Failed to read ids"), ["2", "1"]);
    assert_eq!(ids_of(&view.list().expect("Failed to list")), ["2", "1"]);
}
