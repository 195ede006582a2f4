use bson::{Bson, Document, doc};

use fauxdb_aggregate::{CollectionResolver, parse_pipeline};

use super::support::{as_bool, as_i64, collection_name};
use crate::cursor::DEFAULT_BATCH_SIZE;
use crate::dispatcher::{CommandContext, Dispatcher};
use crate::error::{DispatchError, Result};

/// `aggregate`. The pipeline stages run against the named
/// collection's documents (or, when `collection` is the `1` form, against
/// an empty seed — collectionless aggregations aren't part of this engine's
/// supported stage set).
pub(crate) fn aggregate(dispatcher: &Dispatcher, command: &Document, ctx: &CommandContext) -> Result<Document> {
    let coll = collection_name(command, "aggregate")?;
    let ns = ctx.namespace(&coll);
    let pipeline_docs = match command.get("pipeline") {
        Some(Bson::Array(items)) => items
            .iter()
            .map(|v| match v {
                Bson::Document(d) => Ok(d.clone()),
                _ => Err(DispatchError::BadValue("pipeline entries must be documents".into())),
            })
            .collect::<Result<Vec<Document>>>()?,
        _ => return Err(DispatchError::BadValue("aggregate requires a pipeline array".into())),
    };
    let stages = parse_pipeline(&pipeline_docs)?;

    let cursor_opts = match command.get("cursor") {
        Some(Bson::Document(d)) => Some(d),
        _ => None,
    };
    let batch_size = match cursor_opts.and_then(|d| d.get("batchSize")) {
        Some(v) => as_i64(v, "cursor.batchSize")? as usize,
        None => DEFAULT_BATCH_SIZE,
    };
    let explain = match command.get("explain") {
        Some(v) => as_bool(v, "explain")?,
        None => false,
    };
    if explain {
        return Err(DispatchError::Unsupported("aggregate explain".into()));
    }

    let view = ctx.view(dispatcher)?;
    let resolver = view.resolver(&ctx.db);
    let input = view.collection(&ns).lock().unwrap().documents().to_vec();
    let output = run(input, &stages, &resolver)?;

    let ns_str = ns.to_string();
    let (first_batch, cursor_id) = dispatcher.cursors.lock().unwrap().open(ns_str.clone(), output, batch_size);

    Ok(doc! {
        "cursor": {
            "id": cursor_id,
            "ns": ns_str,
            "firstBatch": Bson::Array(first_batch.into_iter().map(Bson::Document).collect()),
        },
    })
}

fn run(input: Vec<Document>, stages: &[fauxdb_aggregate::Stage], resolver: &dyn CollectionResolver) -> Result<Vec<Document>> {
    Ok(fauxdb_aggregate::run_pipeline(input, stages, resolver)?)
}
