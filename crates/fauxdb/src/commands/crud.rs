use bson::{Bson, Document, doc};

use fauxdb_query::{apply_projection, parse_array_filters, parse_filter, parse_projection, parse_update};

use super::support::{as_bool, as_document, as_i64, collation_of, collection_name, filter_of};
use crate::cursor::DEFAULT_BATCH_SIZE;
use crate::dispatcher::{CommandContext, Dispatcher};
use crate::error::{DispatchError, Result};
use crate::response::write_error;

pub(crate) fn insert(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "insert")?;
    let ns = ctx.namespace(&coll);
    let docs = match command.get("documents") {
        Some(Bson::Array(items)) => items,
        _ => return Err(DispatchError::BadValue("insert requires a documents array".into())),
    };
    let ordered = match command.get("ordered") {
        None => true,
        Some(v) => as_bool(v, "ordered")?,
    };

    let view = ctx.view(dispatcher)?;
    let store = view.collection(&ns);
    let mut inserted = 0i32;
    let mut write_errors = Vec::new();

    for (index, entry) in docs.iter().enumerate() {
        let one = as_document(entry, "documents")?;
        let outcome = store.lock().unwrap().insert_many(vec![one.clone()]);
        match outcome {
            Ok(_) => inserted += 1,
            Err(err) => {
                write_errors.push(write_error(index, &err.into()));
                if ordered {
                    break;
                }
            }
        }
    }
    if inserted > 0 {
        view.mark_dirty(ns);
    }

    let mut body = doc! { "n": inserted };
    if !write_errors.is_empty() {
        body.insert("writeErrors", Bson::Array(write_errors.into_iter().map(Bson::Document).collect()));
    }
    Ok(body)
}

pub(crate) fn find(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "find")?;
    let ns = ctx.namespace(&coll);
    let filter = filter_of(command, "filter")?;
    let collation = collation_of(command)?;

    let view = ctx.view(dispatcher)?;
    let mut docs = view.collection(&ns).lock().unwrap().find(&filter, &collation);

    if let Some(Bson::Document(sort_doc)) = command.get("sort") {
        sort_documents(&mut docs, sort_doc)?;
    }
    if let Some(skip) = command.get("skip") {
        let n = as_i64(skip, "skip")? as usize;
        docs = docs.into_iter().skip(n).collect();
    }
    if let Some(limit) = command.get("limit") {
        let n = as_i64(limit, "limit")?;
        if n > 0 {
            docs.truncate(n as usize);
        }
    }
    if let Some(Bson::Document(proj)) = command.get("projection") {
        let projection = parse_projection(proj)?;
        docs = docs.iter().map(|d| apply_projection(d, &projection)).collect();
    }

    let batch_size = match command.get("batchSize") {
        Some(v) => as_i64(v, "batchSize")? as usize,
        None => DEFAULT_BATCH_SIZE,
    };
    let ns_str = ns.to_string();
    let (first_batch, cursor_id) = dispatcher.cursors.lock().unwrap().open(ns_str.clone(), docs, batch_size);

    Ok(doc! {
        "cursor": {
            "id": cursor_id,
            "ns": ns_str,
            "firstBatch": Bson::Array(first_batch.into_iter().map(Bson::Document).collect()),
        },
    })
}

fn sort_documents(docs: &mut [Document], sort_doc: &Document) -> Result<()> {
    let keys: Vec<(String, i8)> = sort_doc
        .iter()
        .map(|(k, v)| {
            let dir = match v {
                Bson::Int32(1) | Bson::Int64(1) => 1,
                Bson::Int32(-1) | Bson::Int64(-1) => -1,
                _ => return Err(DispatchError::BadValue("sort directions must be 1 or -1".into())),
            };
            Ok((k.clone(), dir))
        })
        .collect::<Result<_>>()?;
    docs.sort_by(|a, b| {
        for (path, dir) in &keys {
            let av = fauxdb_bson::resolve(a, path).into_values().into_iter().next().unwrap_or(Bson::Null);
            let bv = fauxdb_bson::resolve(b, path).into_values().into_iter().next().unwrap_or(Bson::Null);
            let ord = fauxdb_bson::compare_values(&av, &bv);
            if ord != std::cmp::Ordering::Equal {
                return if *dir < 0 { ord.reverse() } else { ord };
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(())
}

pub(crate) fn update(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "update")?;
    let ns = ctx.namespace(&coll);
    let updates = match command.get("updates") {
        Some(Bson::Array(items)) => items,
        _ => return Err(DispatchError::BadValue("update requires an updates array".into())),
    };
    let ordered = match command.get("ordered") {
        None => true,
        Some(v) => as_bool(v, "ordered")?,
    };

    let view = ctx.view(dispatcher)?;
    let store = view.collection(&ns);
    let mut matched_total = 0i64;
    let mut modified_total = 0i64;
    let mut upserted = Vec::new();
    let mut write_errors = Vec::new();
    let mut any_write = false;

    for (index, entry) in updates.iter().enumerate() {
        let spec = as_document(entry, "updates")?;
        let result = apply_one_update(&store, spec);
        match result {
            Ok((outcome, id)) => {
                matched_total += outcome.matched_count as i64;
                modified_total += outcome.modified_count as i64;
                any_write |= outcome.modified_count > 0;
                if let Some(id) = id {
                    upserted.push(doc! { "index": index as i32, "_id": id });
                }
            }
            Err(err) => {
                write_errors.push(write_error(index, &err));
                if ordered {
                    break;
                }
            }
        }
    }
    if any_write {
        view.mark_dirty(ns);
    }

    let mut body = doc! { "n": matched_total, "nModified": modified_total };
    if !upserted.is_empty() {
        body.insert("upserted", Bson::Array(upserted.into_iter().map(Bson::Document).collect()));
    }
    if !write_errors.is_empty() {
        body.insert("writeErrors", Bson::Array(write_errors.into_iter().map(Bson::Document).collect()));
    }
    Ok(body)
}

fn apply_one_update(
    store: &std::sync::Arc<std::sync::Mutex<fauxdb_store::CollectionStore>>,
    spec: &Document,
) -> Result<(fauxdb_store::UpdateOutcome, Option<Bson>)> {
    let filter = filter_of(spec, "q")?;
    let mutation_doc = as_document(
        spec.get("u").ok_or_else(|| DispatchError::BadValue("update entry requires u".into()))?,
        "u",
    )?;
    let mutation = parse_update(mutation_doc)?;
    let multi = match spec.get("multi") {
        Some(v) => as_bool(v, "multi")?,
        None => false,
    };
    let upsert = match spec.get("upsert") {
        Some(v) => as_bool(v, "upsert")?,
        None => false,
    };
    let array_filters = match spec.get("arrayFilters") {
        Some(v) => parse_array_filters(v)?,
        None => Vec::new(),
    };
    let collation = collation_of(spec)?;

    store
        .lock()
        .unwrap()
        .update(&filter, &mutation, &array_filters, &collation, multi, upsert)
        .map_err(DispatchError::from)
}

pub(crate) fn delete(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "delete")?;
    let ns = ctx.namespace(&coll);
    let deletes = match command.get("deletes") {
        Some(Bson::Array(items)) => items,
        _ => return Err(DispatchError::BadValue("delete requires a deletes array".into())),
    };

    let view = ctx.view(dispatcher)?;
    let store = view.collection(&ns);
    let mut deleted_total = 0i64;

    for entry in deletes {
        let spec = as_document(entry, "deletes")?;
        let filter = filter_of(spec, "q")?;
        let collation = collation_of(spec)?;
        let limit_one = match spec.get("limit") {
            Some(v) => as_i64(v, "limit")? == 1,
            None => false,
        };
        let outcome = store.lock().unwrap().delete_many(&filter, &collation, limit_one);
        deleted_total += outcome.deleted_count as i64;
    }
    if deleted_total > 0 {
        view.mark_dirty(ns);
    }

    Ok(doc! { "n": deleted_total })
}

pub(crate) fn count(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "count")?;
    count_impl(dispatcher, &coll, command, "query", ctx)
}

pub(crate) fn count_documents(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "countDocuments")?;
    count_impl(dispatcher, &coll, command, "query", ctx)
}

fn count_impl(dispatcher: &Dispatcher, coll: &str, command: &Document, filter_field: &str, ctx: &CommandContext) -> Result<Document> {
    let ns = ctx.namespace(coll);
    let filter = filter_of(command, filter_field)?;
    let collation = collation_of(command)?;
    let view = ctx.view(dispatcher)?;
    let mut n = view.collection(&ns).lock().unwrap().find(&filter, &collation).len() as i64;
    if let Some(skip) = command.get("skip") {
        let s = as_i64(skip, "skip")?;
        n = (n - s).max(0);
    }
    if let Some(limit) = command.get("limit") {
        let l = as_i64(limit, "limit")?;
        if l > 0 {
            n = n.min(l);
        }
    }
    Ok(doc! { "n": n })
}

pub(crate) fn find_and_modify(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "findAndModify")?;
    let ns = ctx.namespace(&coll);
    let filter = filter_of(command, "query")?;
    let collation = collation_of(command)?;
    let remove = match command.get("remove") {
        Some(v) => as_bool(v, "remove")?,
        None => false,
    };

    let view = ctx.view(dispatcher)?;
    let store = view.collection(&ns);

    if remove {
        let mut guard = store.lock().unwrap();
        let candidates = guard.find(&filter, &collation);
        let Some(first) = candidates.into_iter().next() else {
            return Ok(doc! { "value": Bson::Null, "lastErrorObject": { "n": 0i32 } });
        };
        let id_filter = parse_filter(&doc! { "_id": first.get("_id").cloned().unwrap_or(Bson::Null) })?;
        let outcome = guard.delete_many(&id_filter, &collation, true);
        drop(guard);
        view.mark_dirty(ns);
        return Ok(doc! {
            "value": Bson::Document(first),
            "lastErrorObject": { "n": outcome.deleted_count as i32 },
        });
    }

    let new_requested = match command.get("new") {
        Some(v) => as_bool(v, "new")?,
        None => false,
    };
    let upsert = match command.get("upsert") {
        Some(v) => as_bool(v, "upsert")?,
        None => false,
    };
    let mutation_doc = as_document(
        command
            .get("update")
            .ok_or_else(|| DispatchError::BadValue("findAndModify requires remove or update".into()))?,
        "update",
    )?;
    let mutation = parse_update(mutation_doc)?;
    let array_filters = match command.get("arrayFilters") {
        Some(v) => parse_array_filters(v)?,
        None => Vec::new(),
    };

    let mut guard = store.lock().unwrap();
    let before = guard.find(&filter, &collation).into_iter().next();
    let (outcome, upserted_id) = guard
        .update(&filter, &mutation, &array_filters, &collation, false, upsert)
        .map_err(DispatchError::from)?;
    let after = match (&before, &upserted_id) {
        (Some(b), _) => {
            let id_filter = parse_filter(&doc! { "_id": b.get("_id").cloned().unwrap_or(Bson::Null) })?;
            guard.find(&id_filter, &collation).into_iter().next()
        }
        (None, Some(id)) => {
            let id_filter = parse_filter(&doc! { "_id": id.clone() })?;
            guard.find(&id_filter, &collation).into_iter().next()
        }
        (None, None) => None,
    };
    drop(guard);
    if outcome.modified_count > 0 {
        view.mark_dirty(ns);
    }

    let value = if new_requested { after } else { before };
    let mut last_error = doc! {
        "n": (outcome.matched_count.max(if upserted_id.is_some() { 1 } else { 0 })) as i32,
        "updatedExisting": upserted_id.is_none() && outcome.matched_count > 0,
    };
    if let Some(id) = upserted_id {
        last_error.insert("upserted", id);
    }
    Ok(doc! {
        "value": value.map(Bson::Document).unwrap_or(Bson::Null),
        "lastErrorObject": last_error,
    })
}

pub(crate) fn bulk_write(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let ns_info = match command.get("nsInfo") {
        Some(Bson::Array(items)) => items,
        _ => return Err(DispatchError::BadValue("bulkWrite requires nsInfo".into())),
    };
    let namespaces: Vec<String> = ns_info
        .iter()
        .map(|entry| {
            let d = as_document(entry, "nsInfo")?;
            match d.get("ns") {
                Some(Bson::String(s)) => Ok(s.clone()),
                _ => Err(DispatchError::BadValue("nsInfo entries require ns".into())),
            }
        })
        .collect::<Result<_>>()?;
    let ops = match command.get("ops") {
        Some(Bson::Array(items)) => items,
        _ => return Err(DispatchError::BadValue("bulkWrite requires ops".into())),
    };

    let view = ctx.view(dispatcher)?;
    let mut results = Vec::new();
    let mut n_errors = 0i32;
    let mut touched = std::collections::HashSet::new();

    for (index, entry) in ops.iter().enumerate() {
        let op = as_document(entry, "ops")?;
        let result = run_bulk_op(&view, &namespaces, op, &mut touched);
        match result {
            Ok(summary) => {
                let mut body = doc! { "ok": 1.0, "idx": index as i32 };
                body.extend(summary);
                results.push(body);
            }
            Err(err) => {
                n_errors += 1;
                let (code, code_name) = err.code();
                results.push(doc! {
                    "ok": 0.0,
                    "idx": index as i32,
                    "code": code,
                    "codeName": code_name,
                    "errmsg": err.to_string(),
                });
                break;
            }
        }
    }
    for ns in touched {
        view.mark_dirty(ns);
    }

    Ok(doc! {
        "cursor": {
            "id": 0i64,
            "ns": "admin.$cmd.bulkWrite",
            "firstBatch": Bson::Array(results.into_iter().map(Bson::Document).collect()),
        },
        "nErrors": n_errors,
    })
}

fn run_bulk_op(
    view: &crate::dispatcher::StoreView<'_>,
    namespaces: &[String],
    op: &Document,
    touched: &mut std::collections::HashSet<fauxdb_store::Namespace>,
) -> Result<Document> {
    let ns_for = |idx_val: &Bson| -> Result<fauxdb_store::Namespace> {
        let idx = as_i64(idx_val, "op index")? as usize;
        let full = namespaces
            .get(idx)
            .ok_or_else(|| DispatchError::BadValue("op references unknown nsInfo index".into()))?;
        let (db, coll) = full
            .split_once('.')
            .ok_or_else(|| DispatchError::BadValue("nsInfo ns must be db.collection".into()))?;
        Ok(fauxdb_store::Namespace::new(db.to_string(), coll.to_string()))
    };

    if let Some(idx_val) = op.get("insert") {
        let ns = ns_for(idx_val)?;
        let document = as_document(
            op.get("document").ok_or_else(|| DispatchError::BadValue("insert op requires document".into()))?,
            "document",
        )?;
        view.collection(&ns).lock().unwrap().insert_many(vec![document.clone()])?;
        touched.insert(ns);
        return Ok(doc! { "n": 1i32 });
    }
    if let Some(idx_val) = op.get("update") {
        let ns = ns_for(idx_val)?;
        let filter = filter_of(op, "filter")?;
        let mutation_doc = as_document(
            op.get("updateMods").ok_or_else(|| DispatchError::BadValue("update op requires updateMods".into()))?,
            "updateMods",
        )?;
        let mutation = parse_update(mutation_doc)?;
        let multi = match op.get("multi") {
            Some(v) => as_bool(v, "multi")?,
            None => false,
        };
        let upsert = match op.get("upsert") {
            Some(v) => as_bool(v, "upsert")?,
            None => false,
        };
        let collation = collation_of(op)?;
        let (outcome, upserted_id) = view
            .collection(&ns)
            .lock()
            .unwrap()
            .update(&filter, &mutation, &[], &collation, multi, upsert)
            .map_err(DispatchError::from)?;
        touched.insert(ns);
        let mut body = doc! { "n": outcome.matched_count as i32, "nModified": outcome.modified_count as i32 };
        if let Some(id) = upserted_id {
            body.insert("upserted", id);
        }
        return Ok(body);
    }
    if let Some(idx_val) = op.get("delete") {
        let ns = ns_for(idx_val)?;
        let filter = filter_of(op, "filter")?;
        let collation = collation_of(op)?;
        let multi = match op.get("multi") {
            Some(v) => as_bool(v, "multi")?,
            None => false,
        };
        let outcome = view.collection(&ns).lock().unwrap().delete_many(&filter, &collation, !multi);
        touched.insert(ns);
        return Ok(doc! { "n": outcome.deleted_count as i32 });
    }
    Err(DispatchError::Unsupported("bulkWrite op shape".into()))
}

pub(crate) fn get_more(dispatcher: &Dispatcher, command: &Document) -> Result<Document> {
    let cursor_id = match command.get("getMore") {
        Some(v) => as_i64(v, "getMore")?,
        None => return Err(DispatchError::BadValue("getMore requires a cursor id".into())),
    };
    let batch_size = match command.get("batchSize") {
        Some(v) => as_i64(v, "batchSize")? as usize,
        None => DEFAULT_BATCH_SIZE,
    };
    let (ns, batch, next_id) = dispatcher.cursors.lock().unwrap().get_more(cursor_id, batch_size)?;
    Ok(doc! {
        "cursor": {
            "id": next_id,
            "ns": ns,
            "nextBatch": Bson::Array(batch.into_iter().map(Bson::Document).collect()),
        },
    })
}

pub(crate) fn kill_cursors(dispatcher: &Dispatcher, command: &Document) -> Result<Document> {
    let ids = match command.get("cursors") {
        Some(Bson::Array(items)) => items
            .iter()
            .map(|v| as_i64(v, "cursors"))
            .collect::<Result<Vec<_>>>()?,
        _ => return Err(DispatchError::BadValue("killCursors requires a cursors array".into())),
    };
    let killed = dispatcher.cursors.lock().unwrap().kill(&ids);
    let not_found: Vec<i64> = ids.into_iter().filter(|id| !killed.contains(id)).collect();
    Ok(doc! {
        "cursorsKilled": killed.into_iter().map(Bson::Int64).collect::<Vec<_>>(),
        "cursorsNotFound": not_found.into_iter().map(Bson::Int64).collect::<Vec<_>>(),
        "cursorsAlive": Vec::<Bson>::new(),
        "cursorsUnknown": Vec::<Bson>::new(),
    })
}
