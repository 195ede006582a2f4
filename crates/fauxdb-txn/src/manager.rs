use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bson::{Bson, Document};
use fauxdb_bson::{deep_copy_doc, value_equals};
use fauxdb_store::{EngineStore, Namespace};

use crate::error::{Result, TxnError};
use crate::state::TransactionState;

/// Canonical key derived from a command's `lsid.id` field. Sessions are
/// created implicitly on first observed `lsid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub(crate) fn from_lsid(lsid: &Document) -> Result<Self> {
        let id = lsid
            .get("id")
            .ok_or_else(|| TxnError::BadValue("lsid requires an id".into()))?;
        Ok(SessionId(match id {
            Bson::Binary(b) => format!("bin:{:?}:{}", b.subtype, hex_encode(&b.bytes)),
            Bson::ObjectId(oid) => format!("oid:{}", oid.to_hex()),
            Bson::String(s) => format!("str:{s}"),
            other => format!("raw:{other:?}"),
        }))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Outcome of a `commitTransaction`/`abortTransaction` call, distinguishing a
/// first-time terminal transition from an idempotent replay of an already
/// -terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub replay: bool,
}

struct SessionState {
    state: TransactionState,
    active_txn_number: Option<i64>,
    last_closed_txn_number: Option<i64>,
    /// Baseline snapshot taken at `startTransaction`, used at commit time to
    /// tell which `_id`s were deleted inside the transaction.
    baseline: HashMap<Namespace, Vec<Document>>,
    /// The session's isolated view; reads/writes inside the transaction run
    /// against this instead of the engine store.
    store: Option<EngineStore>,
    dirtied: HashSet<Namespace>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            state: TransactionState::Idle,
            active_txn_number: None,
            last_closed_txn_number: None,
            baseline: HashMap::new(),
            store: None,
            dirtied: HashSet::new(),
        }
    }
}

/// Process-wide, keyed-by-session transaction state. One instance is shared
/// by the dispatcher across all commands.
#[derive(Default)]
pub struct TransactionManager {
    sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve how a command carrying `envelope` should be executed:
    /// `Ok(Some(store))` when it runs inside a transaction's isolated view,
    /// `Ok(None)` when the session has no active transaction (this command
    /// therefore executes directly against the engine store — the caller is
    /// expected to treat this as "non-transactional").
    ///
    /// `start_transaction` begins a new transaction, snapshotting `engine`.
    pub fn begin_if_requested(
        &self,
        session_id: &SessionId,
        txn_number: Option<i64>,
        start_transaction: bool,
        engine: &EngineStore,
    ) -> Result<()> {
        if !start_transaction {
            return Ok(());
        }
        let txn_number = txn_number.ok_or_else(|| TxnError::BadValue("startTransaction requires txnNumber".into()))?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(session_id.clone()).or_default();

        if let Some(last) = session.last_closed_txn_number {
            if txn_number <= last {
                return Err(TxnError::NoSuchTransaction { transient: false });
            }
        }

        let snapshot = engine.snapshot();
        let baseline: HashMap<Namespace, Vec<Document>> = snapshot
            .collections
            .iter()
            .map(|(ns, coll)| (ns.clone(), coll.documents.clone()))
            .collect();
        let txn_store = EngineStore::new();
        txn_store.replace_with(snapshot);

        session.state = TransactionState::InTransaction;
        session.active_txn_number = Some(txn_number);
        session.baseline = baseline;
        session.store = Some(txn_store);
        session.dirtied = HashSet::new();
        Ok(())
    }

    /// Validates that a non-terminal command's `txnNumber` matches the
    /// session's active transaction, failing NoSuchTransaction with
    /// TransientTransactionError for any other non-terminal command against a
    /// stale or unknown txnNumber, and returns the session's isolated store
    /// if the command is running inside an active transaction.
    pub fn resolve_store<'a>(
        &'a self,
        session_id: &SessionId,
        txn_number: Option<i64>,
    ) -> Result<Option<EngineStoreHandle<'a>>> {
        let Some(txn_number) = txn_number else {
            return Ok(None);
        };
        let sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get(session_id)
            .ok_or(TxnError::NoSuchTransaction { transient: true })?;
        if session.state != TransactionState::InTransaction || session.active_txn_number != Some(txn_number) {
            return Err(TxnError::NoSuchTransaction { transient: true });
        }
        drop(sessions);
        Ok(Some(EngineStoreHandle {
            manager: self,
            session_id: session_id.clone(),
        }))
    }

    pub fn record_dirty(&self, session_id: &SessionId, ns: Namespace) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.dirtied.insert(ns);
        }
    }

    /// Commits the session's current transaction into `engine`, merging
    /// namespace-by-namespace in sort order to avoid cross-session deadlock and
    /// applying the "transactional write wins at the same `_id`" rule.
    /// Replaying an already-committed `txnNumber` is idempotent.
    pub fn commit(&self, session_id: &SessionId, txn_number: i64, engine: &EngineStore) -> Result<CommitOutcome> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or(TxnError::NoSuchTransaction { transient: false })?;

        if session.state == TransactionState::Committed && session.last_closed_txn_number == Some(txn_number) {
            return Ok(CommitOutcome { replay: true });
        }
        if session.state != TransactionState::InTransaction || session.active_txn_number != Some(txn_number) {
            return Err(TxnError::NoSuchTransaction { transient: false });
        }

        let txn_store = session.store.take().expect("InTransaction session always has a store");
        let mut dirtied: Vec<Namespace> = session.dirtied.drain().collect();
        dirtied.sort();

        for ns in dirtied {
            let original_ids: Vec<Bson> = session
                .baseline
                .get(&ns)
                .map(|docs| docs.iter().filter_map(|d| d.get("_id").cloned()).collect())
                .unwrap_or_default();
            let final_docs = txn_store.collection(&ns).lock().unwrap().documents().to_vec();
            let final_ids: Vec<Bson> = final_docs.iter().filter_map(|d| d.get("_id").cloned()).collect();
            let deleted_ids: Vec<&Bson> = original_ids
                .iter()
                .filter(|id| !final_ids.iter().any(|f| value_equals(f, id)))
                .collect();

            let live = engine.collection(&ns);
            let mut guard = live.lock().unwrap();
            let mut merged: Vec<Document> = Vec::new();
            let mut applied: Vec<bool> = vec![false; final_docs.len()];
            for doc in guard.documents() {
                let Some(id) = doc.get("_id") else {
                    merged.push(deep_copy_doc(doc));
                    continue;
                };
                if deleted_ids.iter().any(|d| value_equals(d, id)) {
                    continue;
                }
                match final_docs.iter().position(|fd| fd.get("_id").is_some_and(|fid| value_equals(fid, id))) {
                    Some(idx) => {
                        merged.push(final_docs[idx].clone());
                        applied[idx] = true;
                    }
                    None => merged.push(deep_copy_doc(doc)),
                }
            }
            for (idx, doc) in final_docs.into_iter().enumerate() {
                if !applied[idx] {
                    merged.push(doc);
                }
            }
            let indexes = guard.list_indexes();
            guard.replace_contents(merged, indexes);
        }

        session.state = TransactionState::Committed;
        session.last_closed_txn_number = Some(txn_number);
        session.baseline.clear();
        Ok(CommitOutcome { replay: false })
    }

    /// Discards the session's snapshot. Repeated aborts for an already
    /// -aborted `txnNumber` are a no-op.
    pub fn abort(&self, session_id: &SessionId, txn_number: i64) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or(TxnError::NoSuchTransaction { transient: false })?;

        if session.state == TransactionState::Aborted && session.last_closed_txn_number == Some(txn_number) {
            return Ok(());
        }
        if session.state != TransactionState::InTransaction || session.active_txn_number != Some(txn_number) {
            return Err(TxnError::NoSuchTransaction { transient: false });
        }

        session.state = TransactionState::Aborted;
        session.last_closed_txn_number = Some(txn_number);
        session.store = None;
        session.baseline.clear();
        session.dirtied.clear();
        Ok(())
    }
}

/// Borrowed handle to a session's isolated engine-store view, returned by
/// [`TransactionManager::resolve_store`]. Kept separate from `EngineStore`
/// itself so callers cannot accidentally hand a transaction's store to code
/// that expects the main engine.
pub struct EngineStoreHandle<'a> {
    manager: &'a TransactionManager,
    session_id: SessionId,
}

impl EngineStoreHandle<'_> {
    pub fn collection(&self, ns: &Namespace) -> std::sync::Arc<Mutex<fauxdb_store::CollectionStore>> {
        let sessions = self.manager.sessions.lock().unwrap();
        let session = sessions.get(&self.session_id).expect("session exists while handle is alive");
        session.store.as_ref().expect("InTransaction session always has a store").collection(ns)
    }

    pub fn collection_resolver(&self, db: &str) -> TxnResolver<'_> {
        TxnResolver {
            handle: self,
            db: db.to_string(),
        }
    }

    pub fn mark_dirty(&self, ns: Namespace) {
        self.manager.record_dirty(&self.session_id, ns);
    }
}

pub struct TxnResolver<'a> {
    handle: &'a EngineStoreHandle<'a>,
    db: String,
}

impl fauxdb_aggregate::CollectionResolver for TxnResolver<'_> {
    fn resolve(&self, collection: &str) -> Option<Vec<Document>> {
        let ns = Namespace::new(self.db.clone(), collection.to_string());
        let sessions = self.handle.manager.sessions.lock().unwrap();
        let session = sessions.get(&self.handle.session_id)?;
        let store = session.store.as_ref()?;
        if !store.collection_exists(&ns) {
            return None;
        }
        let arc = store.collection(&ns);
        let guard = arc.lock().unwrap();
        Some(guard.documents().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn sid(n: i32) -> SessionId {
        SessionId::from_lsid(&doc! { "id": n }).unwrap()
    }

    #[test]
    fn begin_requires_txn_number_greater_than_last_closed() {
        let mgr = TransactionManager::new();
        let engine = EngineStore::new();
        let id = sid(1);
        mgr.begin_if_requested(&id, Some(1), true, &engine).unwrap();
        mgr.commit(&id, 1, &engine).unwrap();
        let err = mgr.begin_if_requested(&id, Some(1), true, &engine).unwrap_err();
        assert_eq!(err, TxnError::NoSuchTransaction { transient: false });
    }

    #[test]
    fn mismatched_txn_number_is_transient() {
        let mgr = TransactionManager::new();
        let engine = EngineStore::new();
        let id = sid(2);
        mgr.begin_if_requested(&id, Some(5), true, &engine).unwrap();
        let err = mgr.resolve_store(&id, Some(6)).unwrap_err();
        assert!(err.transient());
    }

    #[test]
    fn commit_replay_is_idempotent() {
        let mgr = TransactionManager::new();
        let engine = EngineStore::new();
        let id = sid(3);
        mgr.begin_if_requested(&id, Some(1), true, &engine).unwrap();
        let first = mgr.commit(&id, 1, &engine).unwrap();
        assert!(!first.replay);
        let second = mgr.commit(&id, 1, &engine).unwrap();
        assert!(second.replay);
    }

    #[test]
    fn abort_discards_snapshot_and_replays_as_noop() {
        let mgr = TransactionManager::new();
        let engine = EngineStore::new();
        let id = sid(4);
        mgr.begin_if_requested(&id, Some(1), true, &engine).unwrap();
        mgr.abort(&id, 1).unwrap();
        mgr.abort(&id, 1).unwrap();
    }

    #[test]
    fn transactional_write_wins_at_same_id_on_commit() {
        let mgr = TransactionManager::new();
        let engine = EngineStore::new();
        let ns = Namespace::new("test", "docs");
        engine.collection(&ns).lock().unwrap().insert_many(vec![doc! { "_id": 1, "v": "orig" }]).unwrap();

        let id = sid(5);
        mgr.begin_if_requested(&id, Some(1), true, &engine).unwrap();
        let handle = mgr.resolve_store(&id, Some(1)).unwrap().unwrap();
        {
            let coll = handle.collection(&ns);
            let mut guard = coll.lock().unwrap();
            let filter = fauxdb_query::parse_filter(&doc! { "_id": 1 }).unwrap();
            let mutation = fauxdb_query::parse_update(&doc! { "$set": { "v": "tx" } }).unwrap();
            guard
                .update(&filter, &mutation, &[], &fauxdb_bson::Collation::simple(), false, false)
                .unwrap();
        }
        handle.mark_dirty(ns.clone());

        engine
            .collection(&ns)
            .lock()
            .unwrap()
            .update(
                &fauxdb_query::parse_filter(&doc! { "_id": 1 }).unwrap(),
                &fauxdb_query::parse_update(&doc! { "$set": { "v": "nontx" } }).unwrap(),
                &[],
                &fauxdb_bson::Collation::simple(),
                false,
                false,
            )
            .unwrap();

        mgr.commit(&id, 1, &engine).unwrap();
        let docs = engine.collection(&ns).lock().unwrap().documents().to_vec();
        assert_eq!(docs[0].get_str("v").unwrap(), "tx");
    }
}
