use std::fmt;

/// Errors raised while parsing or evaluating filters, updates and
/// projections. `Unsupported` carries the operator/stage name so the
/// dispatcher can surface a stable, named `UnsupportedFeature` error per
/// the dispatcher's error taxonomy rather than a generic failure.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    BadValue(String),
    Unsupported(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::BadValue(msg) => write!(f, "bad value: {msg}"),
            QueryError::Unsupported(what) => write!(f, "unsupported feature: {what}"),
        }
    }
}

impl std::error::Error for QueryError {}

pub type Result<T> = std::result::Result<T, QueryError>;
