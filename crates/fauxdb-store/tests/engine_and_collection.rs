use bson::doc;
use fauxdb_bson::Collation;
use fauxdb_query::parse_filter;
use fauxdb_store::{EngineStore, IndexDefinition, Namespace};

#[test]
fn insert_find_update_delete_round_trip_across_namespaces() {
    let engine = EngineStore::new();
    let widgets = Namespace::new("shop", "widgets");
    let gadgets = Namespace::new("shop", "gadgets");

    engine
        .collection(&widgets)
        .lock()
        .unwrap()
        .insert_many(vec![doc! { "sku": "a" }, doc! { "sku": "b" }])
        .unwrap();
    engine
        .collection(&gadgets)
        .lock()
        .unwrap()
        .insert_many(vec![doc! { "sku": "a" }])
        .unwrap();

    let collation = Collation::simple();
    let filter = parse_filter(&doc! { "sku": "a" }).unwrap();

    assert_eq!(
        engine.collection(&widgets).lock().unwrap().find(&filter, &collation).len(),
        1
    );
    assert_eq!(
        engine.collection(&gadgets).lock().unwrap().find(&filter, &collation).len(),
        1
    );

    let mutation = fauxdb_query::parse_update(&doc! { "$set": { "qty": 5 } }).unwrap();
    let (outcome, _) = engine
        .collection(&widgets)
        .lock()
        .unwrap()
        .update(&filter, &mutation, &[], &collation, false, false)
        .unwrap();
    assert_eq!(outcome.modified_count, 1);

    let remaining = engine
        .collection(&gadgets)
        .lock()
        .unwrap()
        .delete_many(&filter, &collation, false);
    assert_eq!(remaining.deleted_count, 1);
    assert!(engine.collection(&gadgets).lock().unwrap().documents().is_empty());
    assert_eq!(engine.collection(&widgets).lock().unwrap().documents().len(), 2);
}

#[test]
fn unique_index_rejects_duplicate_across_subsequent_inserts() {
    let engine = EngineStore::new();
    let ns = Namespace::new("shop", "widgets");
    let store = engine.collection(&ns);

    store
        .lock()
        .unwrap()
        .create_indexes(vec![IndexDefinition {
            name: "by_sku".into(),
            key: doc! { "sku": 1 },
            unique: true,
            sparse: false,
            partial_filter_expression: None,
            collation: None,
            expire_after_seconds: None,
        }])
        .unwrap();

    store.lock().unwrap().insert_many(vec![doc! { "sku": "a" }]).unwrap();
    let err = store
        .lock()
        .unwrap()
        .insert_many(vec![doc! { "sku": "a" }])
        .unwrap_err();
    assert_eq!(format!("{err}"), "duplicate key on index: by_sku");
}

#[test]
fn snapshot_and_replace_with_restores_prior_state() {
    let engine = EngineStore::new();
    let ns = Namespace::new("shop", "widgets");
    engine
        .collection(&ns)
        .lock()
        .unwrap()
        .insert_many(vec![doc! { "sku": "a" }])
        .unwrap();

    let snapshot = engine.snapshot();

    engine
        .collection(&ns)
        .lock()
        .unwrap()
        .insert_many(vec![doc! { "sku": "b" }, doc! { "sku": "c" }])
        .unwrap();
    assert_eq!(engine.collection(&ns).lock().unwrap().documents().len(), 3);

    engine.replace_with(snapshot);
    assert_eq!(engine.collection(&ns).lock().unwrap().documents().len(), 1);
}

#[test]
fn collection_resolver_reaches_sibling_namespace_in_same_database() {
    let engine = EngineStore::new();
    engine
        .collection(&Namespace::new("shop", "widgets"))
        .lock()
        .unwrap()
        .insert_many(vec![doc! { "sku": "a" }])
        .unwrap();

    let resolver = engine.collection_resolver("shop");
    let docs = fauxdb_aggregate::CollectionResolver::resolve(&resolver, "widgets").unwrap();
    assert_eq!(docs.len(), 1);
    assert!(fauxdb_aggregate::CollectionResolver::resolve(&resolver, "ghosts").is_none());
}
