use std::fmt;

use fauxdb_aggregate::AggregateError;
use fauxdb_query::QueryError;
use fauxdb_store::StoreError;
use fauxdb_txn::TxnError;

/// Dispatcher-level error taxonomy. Every other crate's error converts
/// into this one via `From`; `DispatchError` is the only type translated
/// into a wire-shaped `{code, codeName, errmsg}` document.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    CommandNotFound(String),
    BadValue(String),
    TypeMismatch(String),
    DuplicateKey(String),
    CursorNotFound(i64),
    NoSuchTransaction { transient: bool },
    Unsupported(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::CommandNotFound(name) => write!(f, "no such command: '{name}'"),
            DispatchError::BadValue(msg) => write!(f, "{msg}"),
            DispatchError::TypeMismatch(msg) => write!(f, "{msg}"),
            DispatchError::DuplicateKey(index) => write!(f, "E11000 duplicate key error, index: {index}"),
            DispatchError::CursorNotFound(id) => write!(f, "cursor id {id} not found"),
            DispatchError::NoSuchTransaction { .. } => write!(f, "no such transaction"),
            DispatchError::Unsupported(what) => write!(f, "{what} is not supported"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl DispatchError {
    /// `(code, codeName)` pair reported back to the caller.
    pub fn code(&self) -> (i32, &'static str) {
        match self {
            DispatchError::CommandNotFound(_) => (59, "CommandNotFound"),
            DispatchError::BadValue(_) => (2, "BadValue"),
            DispatchError::TypeMismatch(_) => (14, "TypeMismatch"),
            DispatchError::DuplicateKey(_) => (11000, "DuplicateKey"),
            DispatchError::CursorNotFound(_) => (43, "CursorNotFound"),
            DispatchError::NoSuchTransaction { .. } => (251, "NoSuchTransaction"),
            DispatchError::Unsupported(_) => (238, "NotImplemented"),
        }
    }

    /// Error labels attached alongside `code`/`codeName`, per the
    /// transaction-state policy.
    pub fn labels(&self) -> Vec<&'static str> {
        match self {
            DispatchError::NoSuchTransaction { transient: true } => vec!["TransientTransactionError"],
            DispatchError::Unsupported(_) => vec!["UnsupportedFeature"],
            _ => Vec::new(),
        }
    }
}

impl From<QueryError> for DispatchError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::BadValue(msg) => DispatchError::BadValue(msg),
            QueryError::Unsupported(what) => DispatchError::Unsupported(what),
        }
    }
}

impl From<AggregateError> for DispatchError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::BadValue(msg) => DispatchError::BadValue(msg),
            AggregateError::Unsupported(what) => DispatchError::Unsupported(what),
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(index) => DispatchError::DuplicateKey(index),
            StoreError::BadValue(msg) => DispatchError::BadValue(msg),
            StoreError::Unsupported(what) => DispatchError::Unsupported(what),
        }
    }
}

impl From<TxnError> for DispatchError {
    fn from(err: TxnError) -> Self {
        match err {
            TxnError::NoSuchTransaction { transient } => DispatchError::NoSuchTransaction { transient },
            TxnError::BadValue(msg) => DispatchError::BadValue(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
