//! Update applier. A `Mutation` is parsed once from a BSON update
//! document and then applied to documents via [`apply`].

mod apply;
mod parse;

pub use apply::apply;
pub use parse::{parse_array_filters, parse_update};

use bson::{Bson, Document};

use crate::filter::FieldPredicate;

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Bson),
    Unset(String),
    Inc(String, Bson),
    AddToSet(String, Vec<Bson>),
    Push(String, Vec<Bson>),
    SetOnInsert(String, Bson),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Operator(Vec<UpdateOp>),
    Replacement(Document),
}

/// A parsed `arrayFilters` entry: `identifier` is the `$[identifier]` name,
/// `sub_path` is the remainder of the dotted path after the identifier (if
/// any), and `predicate` is the condition each matched array element (or its
/// sub-field) must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayFilterCond {
    pub identifier: String,
    pub sub_path: Option<String>,
    pub predicate: FieldPredicate,
}
