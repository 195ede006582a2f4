use bson::{Bson, Document};

use crate::error::{QueryError, Result};
use crate::filter::parse_field_condition;

use super::{ArrayFilterCond, Mutation, UpdateOp};

/// Parse a top-level update document: either an operator document (every key
/// starts with `$`) or a full replacement document (no key starts with `$`).
pub fn parse_update(doc: &Document) -> Result<Mutation> {
    let has_operator = doc.iter().any(|(k, _)| k.starts_with('$'));
    let has_plain = doc.iter().any(|(k, _)| !k.starts_with('$'));

    if has_operator && has_plain {
        return Err(QueryError::BadValue(
            "update document cannot mix operators with replacement fields".into(),
        ));
    }

    if !has_operator {
        return Ok(Mutation::Replacement(doc.clone()));
    }

    let mut ops = Vec::new();
    for (key, value) in doc.iter() {
        let operand = as_document(value, key)?;
        match key.as_str() {
            "$set" => {
                for (path, v) in operand.iter() {
                    ops.push(UpdateOp::Set(path.clone(), v.clone()));
                }
            }
            "$unset" => {
                for (path, _) in operand.iter() {
                    ops.push(UpdateOp::Unset(path.clone()));
                }
            }
            "$inc" => {
                for (path, v) in operand.iter() {
                    if !is_numeric(v) {
                        return Err(QueryError::BadValue(format!(
                            "$inc requires a numeric value for '{path}'"
                        )));
                    }
                    ops.push(UpdateOp::Inc(path.clone(), v.clone()));
                }
            }
            "$setOnInsert" => {
                for (path, v) in operand.iter() {
                    ops.push(UpdateOp::SetOnInsert(path.clone(), v.clone()));
                }
            }
            "$addToSet" => {
                for (path, v) in operand.iter() {
                    ops.push(UpdateOp::AddToSet(path.clone(), parse_each(v)));
                }
            }
            "$push" => {
                for (path, v) in operand.iter() {
                    ops.push(UpdateOp::Push(path.clone(), parse_each(v)));
                }
            }
            other => return Err(QueryError::Unsupported(format!("update operator: {other}"))),
        }
    }
    Ok(Mutation::Operator(ops))
}

fn as_document<'a>(value: &'a Bson, op: &str) -> Result<&'a Document> {
    match value {
        Bson::Document(d) => Ok(d),
        _ => Err(QueryError::BadValue(format!("{op} requires a document operand"))),
    }
}

fn is_numeric(value: &Bson) -> bool {
    matches!(
        value,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
    )
}

/// `{$each: [...]}` expands to multiple values; a bare value is a single
/// element to add/push.
fn parse_each(value: &Bson) -> Vec<Bson> {
    if let Bson::Document(d) = value {
        if let Some(Bson::Array(items)) = d.get("$each") {
            return items.clone();
        }
    }
    vec![value.clone()]
}

/// Parse the `arrayFilters` option: an array of documents, each with a
/// single key of the form `identifier` or `identifier.sub.path`.
pub fn parse_array_filters(value: &Bson) -> Result<Vec<ArrayFilterCond>> {
    let arr = match value {
        Bson::Array(a) => a,
        _ => return Err(QueryError::BadValue("arrayFilters must be an array".into())),
    };
    arr.iter()
        .map(|entry| {
            let doc = match entry {
                Bson::Document(d) => d,
                _ => return Err(QueryError::BadValue("arrayFilters entries must be documents".into())),
            };
            if doc.len() != 1 {
                return Err(QueryError::BadValue(
                    "each arrayFilters entry must bind exactly one identifier".into(),
                ));
            }
            let (key, condition) = doc.iter().next().unwrap();
            let (identifier, sub_path) = match key.split_once('.') {
                Some((id, rest)) => (id.to_string(), Some(rest.to_string())),
                None => (key.clone(), None),
            };
            let predicate = parse_field_condition(condition)?;
            Ok(ArrayFilterCond {
                identifier,
                sub_path,
                predicate,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_set_and_unset() {
        let m = parse_update(&doc! { "$set": { "a": 1 }, "$unset": { "b": "" } }).unwrap();
        match m {
            Mutation::Operator(ops) => assert_eq!(ops.len(), 2),
            _ => panic!("expected operator mutation"),
        }
    }

    #[test]
    fn replacement_document_has_no_operators() {
        let m = parse_update(&doc! { "a": 1, "b": 2 }).unwrap();
        assert!(matches!(m, Mutation::Replacement(_)));
    }

    #[test]
    fn rejects_mixed_operator_and_replacement_keys() {
        assert!(parse_update(&doc! { "$set": { "a": 1 }, "b": 2 }).is_err());
    }

    #[test]
    fn push_each_expands_to_multiple_values() {
        let m = parse_update(&doc! { "$push": { "tags": { "$each": ["a", "b"] } } }).unwrap();
        match m {
            Mutation::Operator(ops) => match &ops[0] {
                UpdateOp::Push(_, values) => assert_eq!(values.len(), 2),
                _ => panic!("expected push"),
            },
            _ => panic!("expected operator mutation"),
        }
    }
}
