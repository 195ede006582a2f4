use bson::Bson;

/// The `$expr` expression language: the subset shared by the matcher and
/// reused verbatim by the aggregation stages in `fauxdb-aggregate` that
/// need to evaluate expressions against a document (`$project`,
/// `$addFields`/`$set`, `$replaceRoot`/`$replaceWith`, `$sortByCount`,
/// `$group`'s `_id`, accumulator arguments).
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `$literal` or any value that isn't itself a `$`-prefixed path/op.
    Literal(Bson),
    /// `"$a.b.c"` — a field path rooted at the current document.
    FieldPath(String),
    /// `"$$ROOT"` / `"$$CURRENT"` / `"$$name"`, optionally with a dotted
    /// continuation (`"$$name.sub"`).
    Variable { name: String, rest: Option<String> },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Eq(Box<Expression>, Box<Expression>),
    Ne(Box<Expression>, Box<Expression>),
    Gt(Box<Expression>, Box<Expression>),
    Gte(Box<Expression>, Box<Expression>),
    Lt(Box<Expression>, Box<Expression>),
    Lte(Box<Expression>, Box<Expression>),
    Add(Vec<Expression>),
    /// Object-shaped expression: every value evaluated and re-assembled
    /// under the same keys, insertion order preserved. This is how
    /// `$project`/`$group._id`/`$addFields` build new documents.
    Object(Vec<(String, Expression)>),
    Array(Vec<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprParseError(pub String);

impl std::fmt::Display for ExprParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expression parse error: {}", self.0)
    }
}

impl std::error::Error for ExprParseError {}
