//! `$expr` / aggregation expression language shared by the query matcher's
//! `$expr` operator and the aggregation pipeline's `$project`, `$addFields`,
//! `$group._id`, accumulator arguments and `$replaceRoot`.

mod eval;
mod expr;
mod parse;

pub use eval::{Variables, eval, truthy};
pub use expr::{ExprParseError, Expression};
pub use parse::parse_expr;
