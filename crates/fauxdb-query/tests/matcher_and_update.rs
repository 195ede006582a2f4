use bson::doc;
use fauxdb_bson::Collation;
use fauxdb_query::{matches, parse_filter, parse_update, apply_update};

#[test]
fn filters_and_updates_compose() {
    let collation = Collation::simple();
    let doc = doc! { "_id": 1, "name": "ada", "tags": ["math", "cs"], "score": 10 };

    let filter = parse_filter(&doc! { "tags": "cs", "score": { "$gte": 5 } }).unwrap();
    assert!(matches(&doc, &filter, &collation));

    let mutation = parse_update(&doc! { "$inc": { "score": 5 }, "$addToSet": { "tags": "physics" } }).unwrap();
    let (updated, changed) = apply_update(&doc, &mutation, &[], &collation, false).unwrap();
    assert!(changed);
    assert_eq!(updated.get_i32("score").unwrap(), 15);
    assert_eq!(updated.get_array("tags").unwrap().len(), 3);

    let no_dup = parse_update(&doc! { "$addToSet": { "tags": "cs" } }).unwrap();
    let (_, changed_again) = apply_update(&updated, &no_dup, &[], &collation, false).unwrap();
    assert!(!changed_again);
}

#[test]
fn replacement_preserves_original_id() {
    let collation = Collation::simple();
    let doc = doc! { "_id": 42, "a": 1 };
    let mutation = parse_update(&doc! { "b": 2 }).unwrap();
    let (replaced, changed) = apply_update(&doc, &mutation, &[], &collation, false).unwrap();
    assert!(changed);
    assert_eq!(replaced.get_i32("_id").unwrap(), 42);
    assert!(!replaced.contains_key("a"));
}
