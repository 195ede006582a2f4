use std::sync::{Arc, Mutex};

use bson::Document;
use fauxdb_aggregate::CollectionResolver;
use fauxdb_store::{CollectionStore, EngineStore, Namespace, NamespaceResolver};
use fauxdb_txn::{EngineStoreHandle, SessionId, TransactionManager, TxnResolver, parse_envelope};
use tracing::{debug, warn};

use crate::commands;
use crate::cursor::CursorTable;
use crate::error::{DispatchError, Result};
use crate::profile::DeploymentProfile;
use crate::response::{err_response, ok_response};

/// The command execution engine's single entry point: owns the engine
/// store, the transaction manager and the cursor table, and turns parsed
/// command documents into MongoDB-shaped responses.
pub struct Dispatcher {
    pub(crate) engine: EngineStore,
    pub(crate) txn: TransactionManager,
    pub(crate) cursors: Mutex<CursorTable>,
    pub(crate) profile: DeploymentProfile,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_profile(DeploymentProfile::Standalone)
    }

    pub fn with_profile(profile: DeploymentProfile) -> Self {
        Self {
            engine: EngineStore::new(),
            txn: TransactionManager::new(),
            cursors: Mutex::new(CursorTable::new()),
            profile,
        }
    }

    pub fn engine(&self) -> &EngineStore {
        &self.engine
    }

    /// `dispatch(command_document) -> response_document`. Never
    /// returns a Rust error: every failure is shaped into an `ok: 0`
    /// response before crossing this boundary.
    pub fn dispatch(&self, command: &Document) -> Document {
        match self.try_dispatch(command) {
            Ok(body) => ok_response(body),
            Err(err) => {
                warn!(error = %err, "command failed");
                err_response(&err)
            }
        }
    }

    fn try_dispatch(&self, command: &Document) -> Result<Document> {
        let (name, _) = command
            .iter()
            .next()
            .ok_or_else(|| DispatchError::BadValue("command document must not be empty".into()))?;
        let name = name.clone();
        debug!(command = %name, "dispatching command");

        match name.as_str() {
            "hello" | "isMaster" | "ismaster" => return commands::admin::hello(self.profile),
            "ping" => return Ok(Document::new()),
            "buildInfo" | "buildinfo" => return commands::admin::build_info(),
            "getParameter" => return commands::admin::get_parameter(command),
            _ => {}
        }

        let envelope = parse_envelope(command)?;
        let db = command_db(command)?;

        if let Some(env) = &envelope {
            self.txn
                .begin_if_requested(&env.session_id, env.txn_number, env.start_transaction, &self.engine)?;
        }

        match name.as_str() {
            "commitTransaction" => {
                let env = envelope.ok_or_else(|| DispatchError::BadValue("commitTransaction requires lsid".into()))?;
                let txn_number = env
                    .txn_number
                    .ok_or_else(|| DispatchError::BadValue("commitTransaction requires txnNumber".into()))?;
                return commands::transactions::commit(self, &env.session_id, txn_number);
            }
            "abortTransaction" => {
                let env = envelope.ok_or_else(|| DispatchError::BadValue("abortTransaction requires lsid".into()))?;
                let txn_number = env
                    .txn_number
                    .ok_or_else(|| DispatchError::BadValue("abortTransaction requires txnNumber".into()))?;
                return commands::transactions::abort(self, &env.session_id, txn_number);
            }
            _ => {}
        }

        let session_id = envelope.as_ref().map(|e| e.session_id.clone());
        let txn_number = envelope.as_ref().and_then(|e| e.txn_number);
        let ctx = CommandContext {
            db,
            session_id,
            txn_number,
        };

        match name.as_str() {
            "insert" => commands::crud::insert(self, command, &ctx),
            "find" => commands::crud::find(self, command, &ctx),
            "update" => commands::crud::update(self, command, &ctx),
            "delete" => commands::crud::delete(self, command, &ctx),
            "findAndModify" | "findandmodify" => commands::crud::find_and_modify(self, command, &ctx),
            "count" => commands::crud::count(self, command, &ctx),
            "countDocuments" => commands::crud::count_documents(self, command, &ctx),
            "bulkWrite" => commands::crud::bulk_write(self, command, &ctx),
            "aggregate" => commands::aggregate::aggregate(self, command, &ctx),
            "createIndexes" => commands::indexes::create_indexes(self, command, &ctx),
            "listIndexes" => commands::indexes::list_indexes(self, command, &ctx),
            "listCollections" => commands::indexes::list_collections(self, &ctx),
            "getMore" => commands::crud::get_more(self, command),
            "killCursors" => commands::crud::kill_cursors(self, command),
            other => Err(DispatchError::CommandNotFound(other.to_string())),
        }
    }
}

/// Per-command context threaded through the command handlers: the resolved
/// target database and whatever transaction envelope was attached.
pub(crate) struct CommandContext {
    pub(crate) db: String,
    pub(crate) session_id: Option<SessionId>,
    pub(crate) txn_number: Option<i64>,
}

impl CommandContext {
    pub(crate) fn namespace(&self, collection: &str) -> Namespace {
        Namespace::new(self.db.clone(), collection.to_string())
    }

    pub(crate) fn view<'a>(&self, dispatcher: &'a Dispatcher) -> Result<StoreView<'a>> {
        if let Some(sid) = &self.session_id {
            if let Some(handle) = dispatcher.txn.resolve_store(sid, self.txn_number)? {
                return Ok(StoreView::Txn(handle));
            }
        }
        Ok(StoreView::Direct(&dispatcher.engine))
    }
}

fn command_db(command: &Document) -> Result<String> {
    command
        .get_str("$db")
        .map(|s| s.to_string())
        .map_err(|_| DispatchError::BadValue("command requires a $db field".into()))
}

/// Abstracts over "running directly against the engine store" and "running
/// inside a transaction's isolated snapshot" so the command handlers don't
/// need to know which one they're in.
pub(crate) enum StoreView<'a> {
    Direct(&'a EngineStore),
    Txn(EngineStoreHandle<'a>),
}

impl<'a> StoreView<'a> {
    pub(crate) fn collection(&self, ns: &Namespace) -> Arc<Mutex<CollectionStore>> {
        match self {
            StoreView::Direct(engine) => engine.collection(ns),
            StoreView::Txn(handle) => handle.collection(ns),
        }
    }

    pub(crate) fn mark_dirty(&self, ns: Namespace) {
        if let StoreView::Txn(handle) = self {
            handle.mark_dirty(ns);
        }
    }

    pub(crate) fn resolver(&self, db: &str) -> AnyResolver<'_> {
        match self {
            StoreView::Direct(engine) => AnyResolver::Direct(engine.collection_resolver(db)),
            StoreView::Txn(handle) => AnyResolver::Txn(handle.collection_resolver(db)),
        }
    }
}

pub(crate) enum AnyResolver<'a> {
    Direct(NamespaceResolver<'a>),
    Txn(TxnResolver<'a>),
}

impl CollectionResolver for AnyResolver<'_> {
    fn resolve(&self, collection: &str) -> Option<Vec<Document>> {
        match self {
            AnyResolver::Direct(r) => r.resolve(collection),
            AnyResolver::Txn(r) => r.resolve(collection),
        }
    }
}
