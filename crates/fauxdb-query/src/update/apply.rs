use std::collections::HashMap;

use bson::{Bson, Document};
use fauxdb_bson::{Collation, PathResolution, deep_copy_doc, resolve, value_equals};

use crate::error::{QueryError, Result};
use crate::filter::eval_predicate;

use super::{ArrayFilterCond, Mutation, UpdateOp};

enum Segment<'a> {
    Field(&'a str),
    Index(usize),
    Filtered(&'a str),
}

fn split_segments(path: &str) -> Vec<Segment<'_>> {
    path.split('.')
        .map(|s| {
            if let Some(inner) = s.strip_prefix("$[").and_then(|r| r.strip_suffix(']')) {
                Segment::Filtered(inner)
            } else if let Ok(i) = s.parse::<usize>() {
                Segment::Index(i)
            } else {
                Segment::Field(s)
            }
        })
        .collect()
}

/// Apply a parsed mutation to a document, returning the resulting document
/// and whether anything actually changed. `is_insert` gates `$setOnInsert`.
pub fn apply(
    doc: &Document,
    mutation: &Mutation,
    array_filters: &[ArrayFilterCond],
    collation: &Collation,
    is_insert: bool,
) -> Result<(Document, bool)> {
    match mutation {
        Mutation::Replacement(replacement) => {
            let mut new_doc = replacement.clone();
            if !new_doc.contains_key("_id") {
                if let Some(id) = doc.get("_id") {
                    new_doc.insert("_id", id.clone());
                }
            }
            let modified = !value_equals(&Bson::Document(doc.clone()), &Bson::Document(new_doc.clone()));
            Ok((new_doc, modified))
        }
        Mutation::Operator(ops) => {
            let mut working = deep_copy_doc(doc);
            let mut modified = false;
            let filters: HashMap<&str, &ArrayFilterCond> =
                array_filters.iter().map(|f| (f.identifier.as_str(), f)).collect();

            for op in ops {
                match op {
                    UpdateOp::Set(path, value) => {
                        modified |= set_path(&mut working, path, value, &filters, collation)?;
                    }
                    UpdateOp::Unset(path) => {
                        modified |= unset_path(&mut working, path, &filters, collation);
                    }
                    UpdateOp::Inc(path, delta) => {
                        let current = resolve(&working, path).into_values().into_iter().next();
                        let updated = increment(current.as_ref(), delta)?;
                        modified |= set_path(&mut working, path, &updated, &filters, collation)?;
                    }
                    UpdateOp::SetOnInsert(path, value) => {
                        if is_insert {
                            modified |= set_path(&mut working, path, value, &filters, collation)?;
                        }
                    }
                    UpdateOp::AddToSet(path, values) => {
                        let current = current_array(&working, path)?;
                        let mut next = current;
                        for v in values {
                            if !next.iter().any(|existing| value_equals(existing, v)) {
                                next.push(v.clone());
                                modified = true;
                            }
                        }
                        set_path(&mut working, path, &Bson::Array(next), &filters, collation)?;
                    }
                    UpdateOp::Push(path, values) => {
                        let mut next = current_array(&working, path)?;
                        if !values.is_empty() {
                            next.extend(values.iter().cloned());
                            modified = true;
                        }
                        set_path(&mut working, path, &Bson::Array(next), &filters, collation)?;
                    }
                }
            }
            Ok((working, modified))
        }
    }
}

fn current_array(doc: &Document, path: &str) -> Result<Vec<Bson>> {
    match resolve(doc, path).into_values().into_iter().next() {
        Some(Bson::Array(items)) => Ok(items),
        Some(_) => Err(QueryError::BadValue(format!(
            "cannot apply an array operator to non-array field '{path}'"
        ))),
        None => Ok(Vec::new()),
    }
}

fn increment(current: Option<&Bson>, delta: &Bson) -> Result<Bson> {
    let base = match current {
        None | Some(Bson::Null) => return Ok(delta.clone()),
        Some(v) => v,
    };
    let as_f64 = |v: &Bson| -> Option<f64> {
        match v {
            Bson::Int32(i) => Some(*i as f64),
            Bson::Int64(i) => Some(*i as f64),
            Bson::Double(d) => Some(*d),
            _ => None,
        }
    };
    let (Some(a), Some(b)) = (as_f64(base), as_f64(delta)) else {
        return Err(QueryError::BadValue("$inc target is not numeric".into()));
    };
    if matches!(base, Bson::Double(_)) || matches!(delta, Bson::Double(_)) {
        return Ok(Bson::Double(a + b));
    }
    if matches!(base, Bson::Int64(_)) || matches!(delta, Bson::Int64(_)) {
        return Ok(Bson::Int64(a as i64 + b as i64));
    }
    Ok(Bson::Int32(a as i32 + b as i32))
}

fn set_path(
    doc: &mut Document,
    path: &str,
    value: &Bson,
    filters: &HashMap<&str, &ArrayFilterCond>,
    collation: &Collation,
) -> Result<bool> {
    let segments = split_segments(path);
    let (first, rest) = segments.split_first().ok_or_else(|| QueryError::BadValue("empty path".into()))?;
    match first {
        Segment::Field(name) => {
            if rest.is_empty() {
                let changed = doc.get(*name).map(|old| !value_equals(old, value)).unwrap_or(true);
                doc.insert(name.to_string(), value.clone());
                Ok(changed)
            } else {
                let entry = doc
                    .entry(name.to_string())
                    .or_insert_with(|| Bson::Document(Document::new()));
                set_in_bson(entry, rest, value, filters, collation)
            }
        }
        _ => Err(QueryError::BadValue("update path must start with a field name".into())),
    }
}

fn set_in_bson(
    node: &mut Bson,
    segments: &[Segment<'_>],
    value: &Bson,
    filters: &HashMap<&str, &ArrayFilterCond>,
    collation: &Collation,
) -> Result<bool> {
    let Some((first, rest)) = segments.split_first() else {
        let changed = !value_equals(node, value);
        *node = value.clone();
        return Ok(changed);
    };
    match first {
        Segment::Field(name) => {
            if matches!(node, Bson::Null) {
                *node = Bson::Document(Document::new());
            }
            let doc = match node {
                Bson::Document(d) => d,
                _ => return Err(QueryError::BadValue(format!("cannot traverse into '{name}'"))),
            };
            if rest.is_empty() {
                let changed = doc.get(*name).map(|old| !value_equals(old, value)).unwrap_or(true);
                doc.insert(name.to_string(), value.clone());
                Ok(changed)
            } else {
                let entry = doc
                    .entry(name.to_string())
                    .or_insert_with(|| Bson::Document(Document::new()));
                set_in_bson(entry, rest, value, filters, collation)
            }
        }
        Segment::Index(i) => {
            if matches!(node, Bson::Null) {
                *node = Bson::Array(Vec::new());
            }
            let arr = match node {
                Bson::Array(a) => a,
                _ => return Err(QueryError::BadValue("expected an array for a numeric path segment".into())),
            };
            while arr.len() <= *i {
                arr.push(Bson::Null);
            }
            if rest.is_empty() {
                let changed = !value_equals(&arr[*i], value);
                arr[*i] = value.clone();
                Ok(changed)
            } else {
                set_in_bson(&mut arr[*i], rest, value, filters, collation)
            }
        }
        Segment::Filtered(id) => {
            let cond = *filters
                .get(id)
                .ok_or_else(|| QueryError::BadValue(format!("no array filter bound for identifier '{id}'")))?;
            let arr = match node {
                Bson::Array(a) => a,
                _ => return Err(QueryError::BadValue("$[] requires an array".into())),
            };
            let mut changed = false;
            for elem in arr.iter_mut() {
                if matches_array_filter(elem, cond, collation) {
                    if rest.is_empty() {
                        if !value_equals(elem, value) {
                            changed = true;
                        }
                        *elem = value.clone();
                    } else {
                        changed |= set_in_bson(elem, rest, value, filters, collation)?;
                    }
                }
            }
            Ok(changed)
        }
    }
}

fn unset_path(
    doc: &mut Document,
    path: &str,
    filters: &HashMap<&str, &ArrayFilterCond>,
    collation: &Collation,
) -> bool {
    let segments = split_segments(path);
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    match first {
        Segment::Field(name) => {
            if rest.is_empty() {
                doc.remove(*name).is_some()
            } else if let Some(node) = doc.get_mut(*name) {
                unset_in_bson(node, rest, filters, collation)
            } else {
                false
            }
        }
        _ => false,
    }
}

fn unset_in_bson(
    node: &mut Bson,
    segments: &[Segment<'_>],
    filters: &HashMap<&str, &ArrayFilterCond>,
    collation: &Collation,
) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    match first {
        Segment::Field(name) => {
            let doc = match node {
                Bson::Document(d) => d,
                _ => return false,
            };
            if rest.is_empty() {
                doc.remove(*name).is_some()
            } else if let Some(next) = doc.get_mut(*name) {
                unset_in_bson(next, rest, filters, collation)
            } else {
                false
            }
        }
        Segment::Index(i) => {
            let arr = match node {
                Bson::Array(a) => a,
                _ => return false,
            };
            if *i >= arr.len() {
                return false;
            }
            if rest.is_empty() {
                let was_null = matches!(arr[*i], Bson::Null);
                arr[*i] = Bson::Null;
                !was_null
            } else {
                unset_in_bson(&mut arr[*i], rest, filters, collation)
            }
        }
        Segment::Filtered(id) => {
            let Some(cond) = filters.get(id).copied() else {
                return false;
            };
            let arr = match node {
                Bson::Array(a) => a,
                _ => return false,
            };
            let mut changed = false;
            for elem in arr.iter_mut() {
                if matches_array_filter(elem, cond, collation) {
                    if rest.is_empty() {
                        let was_null = matches!(elem, Bson::Null);
                        *elem = Bson::Null;
                        changed |= !was_null;
                    } else {
                        changed |= unset_in_bson(elem, rest, filters, collation);
                    }
                }
            }
            changed
        }
    }
}

fn matches_array_filter(element: &Bson, cond: &ArrayFilterCond, collation: &Collation) -> bool {
    match &cond.sub_path {
        Some(sub_path) => match element {
            Bson::Document(d) => {
                let resolution = resolve(d, sub_path);
                eval_predicate(&cond.predicate, &resolution, collation)
            }
            _ => false,
        },
        None => {
            let resolution = PathResolution::Existing(vec![element.clone()]);
            eval_predicate(&cond.predicate, &resolution, collation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_creates_intermediate_documents() {
        let mut doc = doc! {};
        let changed = set_path(&mut doc, "a.b", &Bson::Int32(1), &HashMap::new(), &Collation::simple()).unwrap();
        assert!(changed);
        assert_eq!(doc.get_document("a").unwrap().get_i32("b").unwrap(), 1);
    }

    #[test]
    fn inc_treats_missing_as_zero() {
        assert_eq!(increment(None, &Bson::Int32(5)).unwrap(), Bson::Int32(5));
    }

    #[test]
    fn inc_promotes_to_double() {
        let result = increment(Some(&Bson::Int32(2)), &Bson::Double(0.5)).unwrap();
        assert_eq!(result, Bson::Double(2.5));
    }

    #[test]
    fn unset_removes_field() {
        let mut doc = doc! { "a": 1, "b": 2 };
        let changed = unset_path(&mut doc, "a", &HashMap::new(), &Collation::simple());
        assert!(changed);
        assert!(!doc.contains_key("a"));
    }

    #[test]
    fn array_filter_targets_matching_elements() {
        let cond = ArrayFilterCond {
            identifier: "elem".into(),
            sub_path: Some("qty".into()),
            predicate: crate::filter::parse_field_condition(&bson::bson!({ "$gt": 10 })).unwrap(),
        };
        let mut filters = HashMap::new();
        filters.insert("elem", &cond);
        let mut doc = doc! { "items": [ { "qty": 5 }, { "qty": 20 } ] };
        let changed = set_path(
            &mut doc,
            "items.$[elem].qty",
            &Bson::Int32(0),
            &filters,
            &Collation::simple(),
        )
        .unwrap();
        assert!(changed);
        let items = doc.get_array("items").unwrap();
        assert_eq!(items[0].as_document().unwrap().get_i32("qty").unwrap(), 5);
        assert_eq!(items[1].as_document().unwrap().get_i32("qty").unwrap(), 0);
    }
}
