//! Transaction manager. Tracks per-session transaction state and
//! provides the snapshot/commit/abort mechanics the dispatcher drives from
//! the `lsid`/`txnNumber`/`autocommit`/`startTransaction` envelope on each
//! command.

mod envelope;
mod error;
mod manager;
mod state;

pub use envelope::{TxnEnvelope, parse_envelope};
pub use error::{Result, TxnError};
pub use manager::{CommitOutcome, EngineStoreHandle, SessionId, TransactionManager, TxnResolver};
pub use state::TransactionState;
