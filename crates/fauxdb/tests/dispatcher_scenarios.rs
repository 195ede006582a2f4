use bson::{Bson, doc};
use fauxdb::Dispatcher;

fn lsid(n: i32) -> bson::Document {
    doc! { "id": n }
}

#[test]
fn insert_then_find_by_equality() {
    let dispatcher = Dispatcher::new();
    let reply = dispatcher.dispatch(&doc! {
        "insert": "widgets",
        "documents": [{ "_id": 1, "sku": "a" }, { "_id": 2, "sku": "b" }],
        "$db": "shop",
    });
    assert_eq!(reply.get_f64("ok").unwrap(), 1.0);
    assert_eq!(reply.get_i32("n").unwrap(), 2);

    let found = dispatcher.dispatch(&doc! {
        "find": "widgets",
        "filter": { "sku": "a" },
        "$db": "shop",
    });
    let batch = found.get_document("cursor").unwrap().get_array("firstBatch").unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].as_document().unwrap().get_i32("_id").unwrap(), 1);
}

#[test]
fn ordered_insert_batch_stops_at_duplicate_key() {
    let dispatcher = Dispatcher::new();
    dispatcher.dispatch(&doc! {
        "createIndexes": "widgets",
        "indexes": [{ "key": { "sku": 1 }, "name": "by_sku", "unique": true }],
        "$db": "shop",
    });
    dispatcher.dispatch(&doc! {
        "insert": "widgets",
        "documents": [{ "_id": 1, "sku": "A" }],
        "$db": "shop",
    });

    let reply = dispatcher.dispatch(&doc! {
        "insert": "widgets",
        "documents": [{ "_id": 2, "sku": "B" }, { "_id": 3, "sku": "A" }],
        "$db": "shop",
    });
    assert_eq!(reply.get_i32("n").unwrap(), 1);
    assert!(reply.get_array("writeErrors").is_ok());

    let found = dispatcher.dispatch(&doc! { "find": "widgets", "filter": {}, "$db": "shop" });
    let batch = found.get_document("cursor").unwrap().get_array("firstBatch").unwrap();
    let ids: Vec<i32> = batch.iter().map(|d| d.as_document().unwrap().get_i32("_id").unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn group_and_sort_aggregation() {
    let dispatcher = Dispatcher::new();
    dispatcher.dispatch(&doc! {
        "insert": "orders",
        "documents": [
            { "_id": 1, "region": "east", "amount": 10 },
            { "_id": 2, "region": "west", "amount": 5 },
            { "_id": 3, "region": "east", "amount": 7 },
        ],
        "$db": "shop",
    });

    let reply = dispatcher.dispatch(&doc! {
        "aggregate": "orders",
        "pipeline": [
            { "$group": { "_id": "$region", "total": { "$sum": "$amount" } } },
            { "$sort": { "_id": 1 } },
        ],
        "cursor": {},
        "$db": "shop",
    });
    let batch = reply.get_document("cursor").unwrap().get_array("firstBatch").unwrap();
    assert_eq!(batch.len(), 2);
    let east = batch[0].as_document().unwrap();
    assert_eq!(east.get_str("_id").unwrap(), "east");
    assert_eq!(east.get_i64("total").unwrap(), 17);
}

#[test]
fn lookup_joins_array_local_field() {
    let dispatcher = Dispatcher::new();
    dispatcher.dispatch(&doc! {
        "insert": "orders",
        "documents": [{ "_id": 1, "itemIds": [10, 20] }],
        "$db": "shop",
    });
    dispatcher.dispatch(&doc! {
        "insert": "items",
        "documents": [{ "_id": 10, "name": "widget" }, { "_id": 20, "name": "gadget" }, { "_id": 30, "name": "unrelated" }],
        "$db": "shop",
    });

    let reply = dispatcher.dispatch(&doc! {
        "aggregate": "orders",
        "pipeline": [
            { "$lookup": { "from": "items", "localField": "itemIds", "foreignField": "_id", "as": "items" } },
        ],
        "cursor": {},
        "$db": "shop",
    });
    let batch = reply.get_document("cursor").unwrap().get_array("firstBatch").unwrap();
    let items = batch[0].as_document().unwrap().get_array("items").unwrap();
    assert_eq!(items.len(), 2);
}

#[test]
fn array_filters_scope_set_to_matching_elements() {
    let dispatcher = Dispatcher::new();
    dispatcher.dispatch(&doc! {
        "insert": "carts",
        "documents": [{ "_id": 1, "items": [{ "sku": "a", "qty": 1 }, { "sku": "b", "qty": 1 }] }],
        "$db": "shop",
    });

    let reply = dispatcher.dispatch(&doc! {
        "update": "carts",
        "updates": [{
            "q": { "_id": 1 },
            "u": { "$set": { "items.$[elem].qty": 9 } },
            "arrayFilters": [{ "elem.sku": "b" }],
        }],
        "$db": "shop",
    });
    assert_eq!(reply.get_i32("nModified").unwrap(), 1);

    let found = dispatcher.dispatch(&doc! { "find": "carts", "filter": { "_id": 1 }, "$db": "shop" });
    let batch = found.get_document("cursor").unwrap().get_array("firstBatch").unwrap();
    let items = batch[0].as_document().unwrap().get_array("items").unwrap();
    let a = items[0].as_document().unwrap();
    let b = items[1].as_document().unwrap();
    assert_eq!(a.get_i32("qty").unwrap(), 1);
    assert_eq!(b.get_i32("qty").unwrap(), 9);
}

#[test]
fn transactional_write_wins_at_same_id_on_commit() {
    let dispatcher = Dispatcher::new();
    dispatcher.dispatch(&doc! {
        "insert": "docs",
        "documents": [{ "_id": 1, "v": "orig" }],
        "$db": "shop",
    });

    let session = lsid(7);
    dispatcher.dispatch(&doc! {
        "update": "docs",
        "updates": [{ "q": { "_id": 1 }, "u": { "$set": { "v": "tx" } } }],
        "lsid": session.clone(),
        "txnNumber": 1i64,
        "startTransaction": true,
        "autocommit": false,
        "$db": "shop",
    });

    dispatcher.dispatch(&doc! {
        "update": "docs",
        "updates": [{ "q": { "_id": 1 }, "u": { "$set": { "v": "nontx" } } }],
        "$db": "shop",
    });

    let commit_reply = dispatcher.dispatch(&doc! {
        "commitTransaction": 1,
        "lsid": session.clone(),
        "txnNumber": 1i64,
        "autocommit": false,
        "$db": "admin",
    });
    assert_eq!(commit_reply.get_f64("ok").unwrap(), 1.0);

    let found = dispatcher.dispatch(&doc! { "find": "docs", "filter": { "_id": 1 }, "$db": "shop" });
    let batch = found.get_document("cursor").unwrap().get_array("firstBatch").unwrap();
    assert_eq!(batch[0].as_document().unwrap().get_str("v").unwrap(), "tx");

    let replay = dispatcher.dispatch(&doc! {
        "commitTransaction": 1,
        "lsid": session,
        "txnNumber": 1i64,
        "autocommit": false,
        "$db": "admin",
    });
    let labels = replay.get_array("errorLabels").unwrap();
    assert_eq!(labels[0], Bson::String("UnknownTransactionCommitResult".into()));
}

#[test]
fn mismatched_txn_number_is_transient_transaction_error() {
    let dispatcher = Dispatcher::new();
    let session = lsid(9);
    dispatcher.dispatch(&doc! {
        "find": "docs",
        "filter": {},
        "lsid": session.clone(),
        "txnNumber": 1i64,
        "startTransaction": true,
        "autocommit": false,
        "$db": "shop",
    });

    let reply = dispatcher.dispatch(&doc! {
        "find": "docs",
        "filter": {},
        "lsid": session,
        "txnNumber": 2i64,
        "autocommit": false,
        "$db": "shop",
    });
    assert_eq!(reply.get_f64("ok").unwrap(), 0.0);
    assert_eq!(reply.get_str("codeName").unwrap(), "NoSuchTransaction");
    let labels = reply.get_array("errorLabels").unwrap();
    assert_eq!(labels[0], Bson::String("TransientTransactionError".into()));
}

#[test]
fn get_more_drains_cursor_beyond_first_batch() {
    let dispatcher = Dispatcher::new();
    let documents: Vec<Bson> = (0..5).map(|i| Bson::Document(doc! { "_id": i })).collect();
    dispatcher.dispatch(&doc! { "insert": "big", "documents": documents, "$db": "shop" });

    let first = dispatcher.dispatch(&doc! {
        "find": "big",
        "filter": {},
        "batchSize": 2i32,
        "$db": "shop",
    });
    let cursor = first.get_document("cursor").unwrap();
    assert_eq!(cursor.get_array("firstBatch").unwrap().len(), 2);
    let cursor_id = cursor.get_i64("id").unwrap();
    assert_ne!(cursor_id, 0);

    let more = dispatcher.dispatch(&doc! { "getMore": cursor_id, "collection": "big", "batchSize": 2i32, "$db": "shop" });
    assert_eq!(more.get_document("cursor").unwrap().get_array("nextBatch").unwrap().len(), 2);
}

#[test]
fn delete_with_limit_one_removes_only_first_match() {
    let dispatcher = Dispatcher::new();
    dispatcher.dispatch(&doc! {
        "insert": "widgets",
        "documents": [
            { "_id": 1, "status": "stale" },
            { "_id": 2, "status": "stale" },
            { "_id": 3, "status": "stale" },
        ],
        "$db": "shop",
    });

    let reply = dispatcher.dispatch(&doc! {
        "delete": "widgets",
        "deletes": [{ "q": { "status": "stale" }, "limit": 1i32 }],
        "$db": "shop",
    });
    assert_eq!(reply.get_i32("n").unwrap(), 1);

    let found = dispatcher.dispatch(&doc! { "find": "widgets", "filter": {}, "$db": "shop" });
    let batch = found.get_document("cursor").unwrap().get_array("firstBatch").unwrap();
    let ids: Vec<i32> = batch.iter().map(|d| d.as_document().unwrap().get_i32("_id").unwrap()).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn unsupported_command_reports_command_not_found() {
    let dispatcher = Dispatcher::new();
    let reply = dispatcher.dispatch(&doc! { "mapReduce": "widgets", "$db": "shop" });
    assert_eq!(reply.get_f64("ok").unwrap(), 0.0);
    assert_eq!(reply.get_str("codeName").unwrap(), "CommandNotFound");
}
