use std::collections::HashMap;

use bson::{Bson, Document};
use fauxdb_bson::{compare_values, value_equals};

use crate::expr::Expression;

/// Variable bindings available during evaluation (`$$ROOT`/`$$CURRENT` are
/// implicit — always the document being evaluated — everything else comes
/// from an explicit `let`, e.g. `$lookup`'s `let`).
pub type Variables = HashMap<String, Bson>;

/// Evaluate `expr` against `doc`. Returns `None` when a field path (or a
/// variable's continuation path) does not resolve — MongoDB's "missing"
/// value, distinct from an explicit `Bson::Null`, so callers like
/// `$project` can decide whether to omit a field.
pub fn eval(expr: &Expression, doc: &Document, vars: &Variables) -> Option<Bson> {
    match expr {
        Expression::Literal(v) => Some(v.clone()),
        Expression::FieldPath(path) => eval_field_path(doc, path),
        Expression::Variable { name, rest } => eval_variable(name, rest.as_deref(), doc, vars),
        Expression::And(items) => Some(Bson::Boolean(
            items.iter().all(|e| truthy(eval(e, doc, vars))),
        )),
        Expression::Or(items) => Some(Bson::Boolean(
            items.iter().any(|e| truthy(eval(e, doc, vars))),
        )),
        Expression::Not(inner) => Some(Bson::Boolean(!truthy(eval(inner, doc, vars)))),
        Expression::Eq(a, b) => Some(Bson::Boolean(eval_compare_eq(a, b, doc, vars))),
        Expression::Ne(a, b) => Some(Bson::Boolean(!eval_compare_eq(a, b, doc, vars))),
        Expression::Gt(a, b) => eval_ordering(a, b, doc, vars, |o| o.is_gt()),
        Expression::Gte(a, b) => eval_ordering(a, b, doc, vars, |o| o.is_ge()),
        Expression::Lt(a, b) => eval_ordering(a, b, doc, vars, |o| o.is_lt()),
        Expression::Lte(a, b) => eval_ordering(a, b, doc, vars, |o| o.is_le()),
        Expression::Add(items) => eval_add(items, doc, vars),
        Expression::Object(fields) => {
            let mut out = Document::new();
            for (k, e) in fields {
                if let Some(v) = eval(e, doc, vars) {
                    out.insert(k.clone(), v);
                }
            }
            Some(Bson::Document(out))
        }
        Expression::Array(items) => Some(Bson::Array(
            items
                .iter()
                .map(|e| eval(e, doc, vars).unwrap_or(Bson::Null))
                .collect(),
        )),
    }
}

/// Missing and explicit `null` are both falsy, matching `$and`/`$or`
/// treating absent fields the way MongoDB's boolean coercion does.
pub fn truthy(value: Option<Bson>) -> bool {
    match value {
        None | Some(Bson::Null) => false,
        Some(Bson::Boolean(b)) => b,
        Some(_) => true,
    }
}

fn eval_field_path(doc: &Document, path: &str) -> Option<Bson> {
    match fauxdb_bson::resolve(doc, path) {
        fauxdb_bson::PathResolution::Missing => None,
        fauxdb_bson::PathResolution::Existing(mut values) => {
            if values.len() == 1 {
                Some(values.pop().unwrap())
            } else {
                Some(Bson::Array(values))
            }
        }
    }
}

fn eval_variable(name: &str, rest: Option<&str>, doc: &Document, vars: &Variables) -> Option<Bson> {
    let base = match name {
        "ROOT" | "CURRENT" => Bson::Document(doc.clone()),
        other => vars.get(other)?.clone(),
    };
    match rest {
        None => Some(base),
        Some(path) => navigate(&base, path),
    }
}

fn navigate(value: &Bson, path: &str) -> Option<Bson> {
    let mut current = value.clone();
    for segment in path.split('.') {
        current = match current {
            Bson::Document(d) => d.get(segment)?.clone(),
            Bson::Array(arr) => {
                let idx: usize = segment.parse().ok()?;
                arr.get(idx)?.clone()
            }
            _ => return None,
        };
    }
    Some(current)
}

fn eval_compare_eq(a: &Expression, b: &Expression, doc: &Document, vars: &Variables) -> bool {
    let av = eval(a, doc, vars).unwrap_or(Bson::Null);
    let bv = eval(b, doc, vars).unwrap_or(Bson::Null);
    value_equals(&av, &bv)
}

fn eval_ordering(
    a: &Expression,
    b: &Expression,
    doc: &Document,
    vars: &Variables,
    check: impl Fn(std::cmp::Ordering) -> bool,
) -> Option<Bson> {
    let av = eval(a, doc, vars).unwrap_or(Bson::Null);
    let bv = eval(b, doc, vars).unwrap_or(Bson::Null);
    Some(Bson::Boolean(check(compare_values(&av, &bv))))
}

fn eval_add(items: &[Expression], doc: &Document, vars: &Variables) -> Option<Bson> {
    let mut acc_i: i64 = 0;
    let mut acc_f: f64 = 0.0;
    let mut is_float = false;
    for item in items {
        match eval(item, doc, vars) {
            Some(Bson::Int32(i)) => acc_i += i as i64,
            Some(Bson::Int64(i)) => acc_i += i,
            Some(Bson::Double(d)) => {
                is_float = true;
                acc_f += d;
            }
            Some(Bson::Null) | None => {}
            _ => return None,
        }
    }
    if is_float {
        Some(Bson::Double(acc_f + acc_i as f64))
    } else {
        Some(Bson::Int64(acc_i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_expr;
    use bson::doc;

    #[test]
    fn evaluates_field_path() {
        let e = parse_expr(&Bson::String("$a".into())).unwrap();
        let d = doc! { "a": 5 };
        assert_eq!(eval(&e, &d, &Variables::new()), Some(Bson::Int32(5)));
    }

    #[test]
    fn missing_field_path_is_none() {
        let e = parse_expr(&Bson::String("$missing".into())).unwrap();
        let d = doc! { "a": 5 };
        assert_eq!(eval(&e, &d, &Variables::new()), None);
    }

    #[test]
    fn root_variable_returns_whole_document() {
        let e = parse_expr(&Bson::String("$$ROOT".into())).unwrap();
        let d = doc! { "a": 5 };
        assert_eq!(
            eval(&e, &d, &Variables::new()),
            Some(Bson::Document(d.clone()))
        );
    }

    #[test]
    fn add_sums_numeric_operands() {
        let e = parse_expr(&bson::bson!({ "$add": ["$a", 3] })).unwrap();
        let d = doc! { "a": 2 };
        assert_eq!(eval(&e, &d, &Variables::new()), Some(Bson::Int64(5)));
    }

    #[test]
    fn let_bound_variable_resolves_with_continuation() {
        let mut vars = Variables::new();
        vars.insert("v".to_string(), Bson::Document(doc! { "x": 9 }));
        let e = parse_expr(&Bson::String("$$v.x".into())).unwrap();
        let d = Document::new();
        assert_eq!(eval(&e, &d, &vars), Some(Bson::Int32(9)));
    }
}
