use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TxnError {
    /// No active transaction matches the session/txnNumber pair. `transient`
    /// marks whether a non-terminal command should also carry the
    /// `TransientTransactionError` label (a terminal `commitTransaction`/
    /// `abortTransaction` mismatch never does).
    NoSuchTransaction { transient: bool },
    BadValue(String),
}

impl TxnError {
    pub fn transient(&self) -> bool {
        matches!(self, TxnError::NoSuchTransaction { transient: true })
    }
}

impl fmt::Display for TxnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxnError::NoSuchTransaction { .. } => write!(f, "no such transaction"),
            TxnError::BadValue(msg) => write!(f, "bad value: {msg}"),
        }
    }
}

impl std::error::Error for TxnError {}

pub type Result<T> = std::result::Result<T, TxnError>;
