//! Query matcher. A `Filter` tree is parsed once from a BSON filter
//! document and then evaluated against many documents via [`matches`].

mod eval;
mod parse;
mod regex_support;

pub use eval::matches;
pub use parse::parse_filter;
pub(crate) use eval::eval_predicate;
pub(crate) use parse::parse_field_condition;
pub(crate) use regex_support::compile_regex;

use bson::Bson;
use fauxdb_expr::Expression;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Expr(Expression),
    Field(String, FieldPredicate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    /// Bare `{ field: value }` equality, or a bare regex value.
    Eq(Bson),
    Regex(CompiledRegex),
    Ops(Vec<FieldOp>),
    /// Field-level `$not`, wrapping either an operator document or a regex.
    Not(Box<FieldPredicate>),
}

/// A compiled regex plus the source pattern/options, so equality and
/// debug-printing stay meaningful (the `regex::Regex` type doesn't impl
/// `PartialEq`).
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    pub pattern: String,
    pub options: String,
    pub regex: regex::Regex,
}

impl PartialEq for CompiledRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.options == other.options
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<InEntry>),
    Nin(Vec<InEntry>),
    Exists(bool),
    Type(Vec<i32>),
    Size(i64),
    ElemMatch(ElemMatchSpec),
    All(Vec<AllEntry>),
    Regex(CompiledRegex),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InEntry {
    Value(Bson),
    Regex(CompiledRegex),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AllEntry {
    Value(Bson),
    Regex(CompiledRegex),
    ElemMatch(ElemMatchSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElemMatchSpec {
    /// `$elemMatch` with field criteria, evaluated against each array
    /// element treated as a document.
    Criteria(Box<Filter>),
    /// `$elemMatch` with a bare operator document, evaluated against each
    /// array element's scalar value directly.
    Operators(Vec<FieldOp>),
}
