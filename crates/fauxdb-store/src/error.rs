use std::fmt;

use fauxdb_aggregate::AggregateError;
use fauxdb_query::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    DuplicateKey(String),
    BadValue(String),
    Unsupported(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateKey(index) => write!(f, "duplicate key on index: {index}"),
            StoreError::BadValue(msg) => write!(f, "bad value: {msg}"),
            StoreError::Unsupported(what) => write!(f, "unsupported feature: {what}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<QueryError> for StoreError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::BadValue(msg) => StoreError::BadValue(msg),
            QueryError::Unsupported(what) => StoreError::Unsupported(what),
        }
    }
}

impl From<AggregateError> for StoreError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::BadValue(msg) => StoreError::BadValue(msg),
            AggregateError::Unsupported(what) => StoreError::Unsupported(what),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
