use bson::{Bson, Document};

use fauxdb_bson::Collation;
use fauxdb_query::{Filter, parse_filter};

use crate::error::{DispatchError, Result};

/// The collection name is the value of the command's own key, e.g.
/// `{insert: "widgets", ...}`.
pub(crate) fn collection_name(command: &Document, command_name: &str) -> Result<String> {
    match command.get(command_name) {
        Some(Bson::String(s)) => Ok(s.clone()),
        _ => Err(DispatchError::BadValue(format!("{command_name} requires a collection name"))),
    }
}

pub(crate) fn filter_of(command: &Document, field: &str) -> Result<Filter> {
    match command.get(field) {
        None => parse_filter(&Document::new()).map_err(DispatchError::from),
        Some(Bson::Document(d)) => parse_filter(d).map_err(DispatchError::from),
        Some(_) => Err(DispatchError::BadValue(format!("{field} must be a document"))),
    }
}

pub(crate) fn collation_of(command: &Document) -> Result<Collation> {
    match command.get("collation") {
        None => Ok(Collation::simple()),
        Some(Bson::Document(d)) => {
            bson::from_document(d.clone()).map_err(|e| DispatchError::BadValue(format!("invalid collation: {e}")))
        }
        Some(_) => Err(DispatchError::BadValue("collation must be a document".into())),
    }
}

pub(crate) fn as_i64(value: &Bson, field: &str) -> Result<i64> {
    match value {
        Bson::Int32(n) => Ok(*n as i64),
        Bson::Int64(n) => Ok(*n),
        Bson::Double(d) if d.fract() == 0.0 => Ok(*d as i64),
        _ => Err(DispatchError::BadValue(format!("{field} must be an integer"))),
    }
}

pub(crate) fn as_bool(value: &Bson, field: &str) -> Result<bool> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        _ => Err(DispatchError::BadValue(format!("{field} must be a boolean"))),
    }
}

pub(crate) fn as_document<'a>(value: &'a Bson, field: &str) -> Result<&'a Document> {
    match value {
        Bson::Document(d) => Ok(d),
        _ => Err(DispatchError::BadValue(format!("{field} must be a document"))),
    }
}
