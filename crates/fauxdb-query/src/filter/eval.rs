use std::collections::HashMap;

use bson::{Bson, Document};
use fauxdb_bson::{Collation, PathResolution, compare_values, matches_type_code, resolve, value_equals};
use fauxdb_expr::{eval as eval_expr, truthy};

use super::{AllEntry, ElemMatchSpec, FieldOp, FieldPredicate, Filter, InEntry};

/// Evaluate a parsed filter against a document.
pub fn matches(doc: &Document, filter: &Filter, collation: &Collation) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| matches(doc, c, collation)),
        Filter::Or(children) => !children.is_empty() && children.iter().any(|c| matches(doc, c, collation)),
        Filter::Nor(children) => !children.iter().any(|c| matches(doc, c, collation)),
        Filter::Not(inner) => !matches(doc, inner, collation),
        Filter::Expr(expr) => {
            let vars = HashMap::new();
            truthy(eval_expr(expr, doc, &vars))
        }
        Filter::Field(path, predicate) => {
            let resolution = resolve(doc, path);
            eval_predicate(predicate, &resolution, collation)
        }
    }
}

pub(crate) fn eval_predicate(predicate: &FieldPredicate, resolution: &PathResolution, collation: &Collation) -> bool {
    match predicate {
        FieldPredicate::Eq(target) => field_equals(resolution, target, collation),
        FieldPredicate::Regex(re) => field_regex_matches(resolution, re),
        FieldPredicate::Ops(ops) => ops.iter().all(|op| eval_field_op(op, resolution, collation)),
        FieldPredicate::Not(inner) => !eval_predicate(inner, resolution, collation),
    }
}

fn candidates(resolution: &PathResolution) -> Vec<Bson> {
    match resolution {
        PathResolution::Missing => vec![Bson::Null],
        PathResolution::Existing(values) => values.clone(),
    }
}

/// MongoDB equality against a path: the bare value matches if ANY candidate
/// equals it directly, OR (when a candidate is an array) any element of that
/// array equals it.
fn field_equals(resolution: &PathResolution, target: &Bson, collation: &Collation) -> bool {
    let values = candidates(resolution);
    values.iter().any(|v| value_equals_collated(v, target, collation) || array_contains(v, target, collation))
}

fn array_contains(value: &Bson, target: &Bson, collation: &Collation) -> bool {
    match value {
        Bson::Array(items) => items.iter().any(|i| value_equals_collated(i, target, collation)),
        _ => false,
    }
}

fn value_equals_collated(a: &Bson, b: &Bson, collation: &Collation) -> bool {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => collation.strings_equal(x, y),
        _ => value_equals(a, b),
    }
}

fn field_regex_matches(resolution: &PathResolution, re: &super::CompiledRegex) -> bool {
    let values = candidates(resolution);
    values.iter().any(|v| regex_matches_value(v, re))
}

fn regex_matches_value(value: &Bson, re: &super::CompiledRegex) -> bool {
    match value {
        Bson::String(s) => re.regex.is_match(s),
        Bson::Array(items) => items.iter().any(|i| regex_matches_value(i, re)),
        _ => false,
    }
}

fn eval_field_op(op: &FieldOp, resolution: &PathResolution, collation: &Collation) -> bool {
    match op {
        FieldOp::Eq(target) => field_equals(resolution, target, collation),
        FieldOp::Ne(target) => !field_equals(resolution, target, collation),
        FieldOp::Gt(target) => compare_any(resolution, target, |o| o == std::cmp::Ordering::Greater),
        FieldOp::Gte(target) => compare_any(resolution, target, |o| o != std::cmp::Ordering::Less),
        FieldOp::Lt(target) => compare_any(resolution, target, |o| o == std::cmp::Ordering::Less),
        FieldOp::Lte(target) => compare_any(resolution, target, |o| o != std::cmp::Ordering::Greater),
        FieldOp::In(entries) => entries.iter().any(|e| in_entry_matches(e, resolution, collation)),
        FieldOp::Nin(entries) => !entries.iter().any(|e| in_entry_matches(e, resolution, collation)),
        FieldOp::Exists(expected) => !matches!(resolution, PathResolution::Missing) == *expected,
        FieldOp::Type(codes) => candidates(resolution)
            .iter()
            .any(|v| codes.iter().any(|c| matches_type_code(v, *c))),
        FieldOp::Size(n) => candidates(resolution).iter().any(|v| match v {
            Bson::Array(items) => items.len() as i64 == *n,
            _ => false,
        }),
        FieldOp::ElemMatch(spec) => candidates(resolution)
            .iter()
            .any(|v| elem_match_matches(spec, v, collation)),
        FieldOp::All(entries) => {
            let array = candidates(resolution).into_iter().find_map(|v| match v {
                Bson::Array(items) => Some(items),
                _ => None,
            });
            match array {
                Some(items) => entries.iter().all(|e| all_entry_matches(e, &items, collation)),
                None => entries.is_empty(),
            }
        }
        FieldOp::Regex(re) => field_regex_matches(resolution, re),
    }
}

fn compare_any(resolution: &PathResolution, target: &Bson, accept: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    candidates(resolution).iter().any(|v| accept(compare_values(v, target)))
}

fn in_entry_matches(entry: &InEntry, resolution: &PathResolution, collation: &Collation) -> bool {
    match entry {
        InEntry::Value(v) => field_equals(resolution, v, collation),
        InEntry::Regex(re) => field_regex_matches(resolution, re),
    }
}

fn all_entry_matches(entry: &AllEntry, items: &[Bson], collation: &Collation) -> bool {
    match entry {
        AllEntry::Value(v) => items.iter().any(|i| value_equals_collated(i, v, collation)),
        AllEntry::Regex(re) => items.iter().any(|i| regex_matches_value(i, re)),
        AllEntry::ElemMatch(spec) => items.iter().any(|i| elem_match_matches(spec, i, collation)),
    }
}

fn elem_match_matches(spec: &ElemMatchSpec, element: &Bson, collation: &Collation) -> bool {
    match spec {
        ElemMatchSpec::Criteria(filter) => match element {
            Bson::Document(d) => matches(d, filter, collation),
            _ => false,
        },
        ElemMatchSpec::Operators(ops) => {
            let resolution = PathResolution::Existing(vec![element.clone()]);
            ops.iter().all(|op| eval_field_op(op, &resolution, collation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse::parse_filter;
    use bson::doc;

    fn m(doc: &Document, filter_doc: &Document) -> bool {
        let filter = parse_filter(filter_doc).unwrap();
        matches(doc, &filter, &Collation::simple())
    }

    #[test]
    fn implicit_and_of_fields() {
        let d = doc! { "a": 1, "b": 2 };
        assert!(m(&d, &doc! { "a": 1, "b": 2 }));
        assert!(!m(&d, &doc! { "a": 1, "b": 3 }));
    }

    #[test]
    fn array_contains_semantics() {
        let d = doc! { "tags": ["red", "green"] };
        assert!(m(&d, &doc! { "tags": "red" }));
        assert!(!m(&d, &doc! { "tags": "blue" }));
    }

    #[test]
    fn empty_or_matches_nothing() {
        let d = doc! { "a": 1 };
        assert!(!m(&d, &doc! { "$or": [] }));
    }

    #[test]
    fn exists_false_matches_missing() {
        let d = doc! { "a": 1 };
        assert!(m(&d, &doc! { "b": { "$exists": false } }));
        assert!(!m(&d, &doc! { "a": { "$exists": false } }));
    }

    #[test]
    fn elem_match_criteria_over_documents() {
        let d = doc! { "items": [ { "qty": 1 }, { "qty": 5 } ] };
        assert!(m(&d, &doc! { "items": { "$elemMatch": { "qty": { "$gt": 3 } } } }));
    }

    #[test]
    fn all_requires_every_entry_present() {
        let d = doc! { "tags": ["a", "b", "c"] };
        assert!(m(&d, &doc! { "tags": { "$all": ["a", "c"] } }));
        assert!(!m(&d, &doc! { "tags": { "$all": ["a", "z"] } }));
    }

    #[test]
    fn field_level_not_negates_regex() {
        let d = doc! { "name": "alice" };
        assert!(m(&d, &doc! { "name": { "$not": { "$regex": "^bob" } } }));
        assert!(!m(&d, &doc! { "name": { "$not": { "$regex": "^al" } } }));
    }
}
