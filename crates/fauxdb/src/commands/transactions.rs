use bson::{Bson, Document};

use fauxdb_txn::SessionId;

use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// `commitTransaction`. A replayed commit (identical `lsid`/`txnNumber`
/// observed as a duplicate) reports `UnknownTransactionCommitResult` so the
/// driver knows the outcome was already decided rather than freshly applied.
pub(crate) fn commit(dispatcher: &Dispatcher, session_id: &SessionId, txn_number: i64) -> Result<Document> {
    let outcome = dispatcher.txn.commit(session_id, txn_number, dispatcher.engine())?;
    let mut body = Document::new();
    if outcome.replay {
        body.insert(
            "errorLabels",
            Bson::Array(vec![Bson::String("UnknownTransactionCommitResult".into())]),
        );
    }
    Ok(body)
}

/// `abortTransaction`. Idempotent after the first call for a given
/// `txnNumber`.
pub(crate) fn abort(dispatcher: &Dispatcher, session_id: &SessionId, txn_number: i64) -> Result<Document> {
    dispatcher.txn.abort(session_id, txn_number)?;
    Ok(Document::new())
}
