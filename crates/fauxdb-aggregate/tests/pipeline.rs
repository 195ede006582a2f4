use bson::{Bson, Document, doc};
use fauxdb_aggregate::{CollectionResolver, parse_pipeline, run_pipeline};

struct FakeResolver {
    collections: std::collections::HashMap<String, Vec<Document>>,
}

impl CollectionResolver for FakeResolver {
    fn resolve(&self, collection: &str) -> Option<Vec<Document>> {
        self.collections.get(collection).cloned()
    }
}

fn no_resolver() -> FakeResolver {
    FakeResolver {
        collections: std::collections::HashMap::new(),
    }
}

#[test]
fn group_by_key_then_sort() {
    let input = vec![
        doc! { "k": "a", "v": 1 },
        doc! { "k": "b", "v": 2 },
        doc! { "k": "a", "v": 3 },
    ];
    let stages = parse_pipeline(&[
        doc! { "$group": { "_id": "$k", "total": { "$sum": "$v" } } },
        doc! { "$sort": { "_id": 1 } },
    ])
    .unwrap();
    let out = run_pipeline(input, &stages, &no_resolver()).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get_str("_id").unwrap(), "a");
    assert_eq!(out[0].get_i64("total").unwrap(), 4);
    assert_eq!(out[1].get_str("_id").unwrap(), "b");
    assert_eq!(out[1].get_i64("total").unwrap(), 2);
}

#[test]
fn lookup_local_foreign_matches_array_elements() {
    let outer = vec![doc! { "_id": 1, "tags": ["x", "y"] }];
    let foreign = vec![
        doc! { "_id": "x", "w": 1 },
        doc! { "_id": "z", "w": 9 },
    ];
    let mut collections = std::collections::HashMap::new();
    collections.insert("tags".to_string(), foreign);
    let resolver = FakeResolver { collections };

    let stages = parse_pipeline(&[
        doc! { "$lookup": { "from": "tags", "localField": "tags", "foreignField": "_id", "as": "t" } },
    ])
    .unwrap();
    let out = run_pipeline(outer, &stages, &resolver).unwrap();
    let joined = out[0].get_array("t").unwrap();
    assert_eq!(joined.len(), 1);
    match &joined[0] {
        Bson::Document(d) => assert_eq!(d.get_str("_id").unwrap(), "x"),
        _ => panic!("expected document"),
    }
}

#[test]
fn unwind_preserve_null_and_empty_keeps_document() {
    let input = vec![doc! { "_id": 1, "tags": [] }, doc! { "_id": 2 }];
    let stages = parse_pipeline(&[
        doc! { "$unwind": { "path": "$tags", "preserveNullAndEmptyArrays": true } },
    ])
    .unwrap();
    let out = run_pipeline(input, &stages, &no_resolver()).unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn project_sole_id_inclusion_is_not_rejected_as_empty() {
    let input = vec![doc! { "_id": 1, "name": "a" }];
    let stages = parse_pipeline(&[doc! { "$project": { "_id": 1 } }]).unwrap();
    let out = run_pipeline(input, &stages, &no_resolver()).unwrap();
    assert_eq!(out, vec![doc! { "_id": 1 }]);
}

#[test]
fn project_with_no_fields_is_rejected() {
    let err = parse_pipeline(&[doc! { "$project": {} }]).unwrap_err();
    assert!(err.to_string().contains("cannot be empty"));
}

#[test]
fn count_on_empty_input_yields_no_document() {
    let stages = parse_pipeline(&[doc! { "$count": "n" }]).unwrap();
    let out = run_pipeline(Vec::new(), &stages, &no_resolver()).unwrap();
    assert!(out.is_empty());
}

#[test]
fn sort_by_count_orders_desc_then_id_asc() {
    let input = vec![
        doc! { "k": "a" },
        doc! { "k": "b" },
        doc! { "k": "a" },
        doc! { "k": "c" },
        doc! { "k": "b" },
    ];
    let stages = parse_pipeline(&[doc! { "$sortByCount": "$k" }]).unwrap();
    let out = run_pipeline(input, &stages, &no_resolver()).unwrap();
    assert_eq!(out[0].get_str("_id").unwrap(), "a");
    assert_eq!(out[0].get_i64("count").unwrap(), 2);
    assert_eq!(out[1].get_str("_id").unwrap(), "b");
    assert_eq!(out[2].get_str("_id").unwrap(), "c");
}
