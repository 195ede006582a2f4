use bson::{Bson, Document, doc};

use fauxdb_bson::Collation;
use fauxdb_store::IndexDefinition;

use super::support::{as_bool, as_document, as_i64, collection_name};
use crate::dispatcher::{CommandContext, Dispatcher};
use crate::error::{DispatchError, Result};

/// `createIndexes`. Only single-field `unique` indexes are enforced;
/// every other option is accepted and stored but otherwise inert, matching
/// `fauxdb-store`'s `IndexDefinition`.
pub(crate) fn create_indexes(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "createIndexes")?;
    let ns = ctx.namespace(&coll);
    let specs = match command.get("indexes") {
        Some(Bson::Array(items)) => items,
        _ => return Err(DispatchError::BadValue("createIndexes requires an indexes array".into())),
    };

    let defs = specs
        .iter()
        .map(|entry| parse_index_definition(as_document(entry, "indexes")?))
        .collect::<Result<Vec<_>>>()?;

    let view = ctx.view(dispatcher)?;
    let existed = dispatcher.engine().collection_exists(&ns);
    let store = view.collection(&ns);
    let (before, after) = store.lock().unwrap().create_indexes(defs).map_err(DispatchError::from)?;

    Ok(doc! {
        "numIndexesBefore": before as i32,
        "numIndexesAfter": after as i32,
        "createdCollectionAutomatically": !existed,
    })
}

fn parse_index_definition(doc: &Document) -> Result<IndexDefinition> {
    let key = match doc.get("key") {
        Some(Bson::Document(k)) => k.clone(),
        _ => return Err(DispatchError::BadValue("index spec requires key".into())),
    };
    let name = match doc.get("name") {
        Some(Bson::String(s)) => s.clone(),
        _ => default_index_name(&key),
    };
    let unique = match doc.get("unique") {
        Some(v) => as_bool(v, "unique")?,
        None => false,
    };
    let sparse = match doc.get("sparse") {
        Some(v) => as_bool(v, "sparse")?,
        None => false,
    };
    let partial_filter_expression = match doc.get("partialFilterExpression") {
        Some(Bson::Document(d)) => Some(d.clone()),
        None => None,
        Some(_) => return Err(DispatchError::BadValue("partialFilterExpression must be a document".into())),
    };
    let collation = match doc.get("collation") {
        Some(Bson::Document(d)) => {
            Some(bson::from_document::<Collation>(d.clone()).map_err(|e| DispatchError::BadValue(format!("invalid collation: {e}")))?)
        }
        None => None,
        Some(_) => return Err(DispatchError::BadValue("collation must be a document".into())),
    };
    let expire_after_seconds = match doc.get("expireAfterSeconds") {
        Some(v) => Some(as_i64(v, "expireAfterSeconds")?),
        None => None,
    };

    Ok(IndexDefinition {
        name,
        key,
        unique,
        sparse,
        partial_filter_expression,
        collation,
        expire_after_seconds,
    })
}

fn default_index_name(key: &Document) -> String {
    key.iter()
        .map(|(k, v)| format!("{k}_{}", direction_label(v)))
        .collect::<Vec<_>>()
        .join("_")
}

fn direction_label(value: &Bson) -> String {
    match value {
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) => n.to_string(),
        Bson::String(s) => s.clone(),
        _ => "1".to_string(),
    }
}

pub(crate) fn list_indexes(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "listIndexes")?;
    let ns = ctx.namespace(&coll);
    let view = ctx.view(dispatcher)?;
    let defs = view.collection(&ns).lock().unwrap().list_indexes();

    let batch: Vec<Bson> = defs.into_iter().map(index_definition_to_doc).map(Bson::Document).collect();
    Ok(doc! {
        "cursor": {
            "id": 0i64,
            "ns": ns.to_string(),
            "firstBatch": batch,
        },
    })
}

fn index_definition_to_doc(def: IndexDefinition) -> Document {
    let mut out = doc! {
        "v": 2i32,
        "key": def.key,
        "name": def.name,
    };
    if def.unique {
        out.insert("unique", true);
    }
    if def.sparse {
        out.insert("sparse", true);
    }
    if let Some(expr) = def.partial_filter_expression {
        out.insert("partialFilterExpression", expr);
    }
    if let Some(secs) = def.expire_after_seconds {
        out.insert("expireAfterSeconds", secs);
    }
    out
}

pub(crate) fn list_collections(dispatcher: &Dispatcher, ctx: &CommandContext) -> Result<Document> {
    let engine = dispatcher.engine();
    let batch: Vec<Bson> = engine
        .namespaces()
        .into_iter()
        .filter(|ns| ns.db == ctx.db)
        .map(|ns| {
            Bson::Document(doc! {
                "name": ns.collection.clone(),
                "type": "collection",
                "options": {},
                "info": { "readOnly": false },
            })
        })
        .collect();

    Ok(doc! {
        "cursor": {
            "id": 0i64,
            "ns": format!("{}.$cmd.listCollections", ctx.db),
            "firstBatch": batch,
        },
    })
}
