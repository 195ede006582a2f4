use std::fmt;

use fauxdb_query::QueryError;

/// Errors raised while parsing or executing an aggregation pipeline.
/// `Unsupported` carries the stage/option name so the dispatcher can surface
/// a stable, named `UnsupportedFeature` error.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateError {
    BadValue(String),
    Unsupported(String),
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::BadValue(msg) => write!(f, "bad value: {msg}"),
            AggregateError::Unsupported(what) => write!(f, "unsupported feature: {what}"),
        }
    }
}

impl std::error::Error for AggregateError {}

impl From<QueryError> for AggregateError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::BadValue(msg) => AggregateError::BadValue(msg),
            QueryError::Unsupported(what) => AggregateError::Unsupported(what),
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregateError>;
