use bson::{Bson, Document};
use fauxdb_bson::{type_alias_code, type_code};
use fauxdb_expr::parse_expr;

use crate::error::{QueryError, Result};

use super::regex_support::compile_regex;
use super::{AllEntry, ElemMatchSpec, FieldOp, FieldPredicate, Filter, InEntry};

/// Parse a top-level BSON filter document into a [`Filter`] tree. An empty
/// document is the identity filter (matches everything — `And([])`).
pub fn parse_filter(doc: &Document) -> Result<Filter> {
    let mut children = Vec::new();

    for (key, value) in doc.iter() {
        match key.as_str() {
            "$and" => children.push(Filter::And(parse_filter_array(value)?)),
            "$or" => children.push(Filter::Or(parse_filter_array(value)?)),
            "$nor" => children.push(Filter::Nor(parse_filter_array(value)?)),
            "$not" => {
                let sub = as_document(value, "$not")?;
                children.push(Filter::Not(Box::new(parse_filter(sub)?)));
            }
            "$expr" => {
                let expr =
                    parse_expr(value).map_err(|e| QueryError::BadValue(e.to_string()))?;
                children.push(Filter::Expr(expr));
            }
            k if k.starts_with('$') => {
                return Err(QueryError::Unsupported(format!(
                    "top-level operator: {k}"
                )));
            }
            field => children.push(Filter::Field(
                field.to_string(),
                parse_field_condition(value)?,
            )),
        }
    }

    Ok(Filter::And(children))
}

fn as_document<'a>(value: &'a Bson, ctx: &str) -> Result<&'a Document> {
    match value {
        Bson::Document(d) => Ok(d),
        _ => Err(QueryError::BadValue(format!("{ctx} requires a document"))),
    }
}

fn parse_filter_array(value: &Bson) -> Result<Vec<Filter>> {
    let arr = match value {
        Bson::Array(a) => a,
        _ => return Err(QueryError::BadValue("expected an array of filters".into())),
    };
    arr.iter()
        .map(|v| match v {
            Bson::Document(d) => parse_filter(d),
            _ => Err(QueryError::BadValue(
                "logical operator array elements must be documents".into(),
            )),
        })
        .collect()
}

pub(crate) fn parse_field_condition(value: &Bson) -> Result<FieldPredicate> {
    match value {
        Bson::RegularExpression(re) => {
            Ok(FieldPredicate::Regex(compile_regex(&re.pattern, &re.options)?))
        }
        Bson::Document(doc) if is_operator_document(doc) => {
            if doc.len() == 1 {
                if let Some((key, inner)) = doc.iter().next() {
                    if key == "$not" {
                        return Ok(FieldPredicate::Not(Box::new(parse_not_target(inner)?)));
                    }
                }
            }
            if doc.contains_key("$not") {
                return Err(QueryError::Unsupported(
                    "$not combined with other operators".into(),
                ));
            }
            Ok(FieldPredicate::Ops(parse_operator_doc(doc)?))
        }
        other => Ok(FieldPredicate::Eq(other.clone())),
    }
}

fn parse_not_target(value: &Bson) -> Result<FieldPredicate> {
    match value {
        Bson::RegularExpression(re) => {
            Ok(FieldPredicate::Regex(compile_regex(&re.pattern, &re.options)?))
        }
        Bson::Document(doc) => Ok(FieldPredicate::Ops(parse_operator_doc(doc)?)),
        _ => Err(QueryError::BadValue(
            "$not requires an operator document or a regex".into(),
        )),
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.iter()
        .next()
        .is_some_and(|(k, _)| k.starts_with('$'))
}

fn parse_operator_doc(doc: &Document) -> Result<Vec<FieldOp>> {
    let mut ops = Vec::new();
    let regex_pattern = doc.get("$regex");
    let regex_options = doc.get_str("$options").ok().map(|s| s.to_string());

    if let Some(pattern_val) = regex_pattern {
        let (pattern, options) = match pattern_val {
            Bson::RegularExpression(re) => (
                re.pattern.clone(),
                regex_options.unwrap_or_else(|| re.options.clone()),
            ),
            Bson::String(s) => (s.clone(), regex_options.unwrap_or_default()),
            _ => return Err(QueryError::BadValue("$regex must be a string or regex".into())),
        };
        ops.push(FieldOp::Regex(compile_regex(&pattern, &options)?));
    }

    for (key, value) in doc.iter() {
        match key.as_str() {
            "$regex" | "$options" => continue,
            "$eq" => ops.push(FieldOp::Eq(value.clone())),
            "$ne" => ops.push(FieldOp::Ne(value.clone())),
            "$gt" => ops.push(FieldOp::Gt(value.clone())),
            "$gte" => ops.push(FieldOp::Gte(value.clone())),
            "$lt" => ops.push(FieldOp::Lt(value.clone())),
            "$lte" => ops.push(FieldOp::Lte(value.clone())),
            "$in" => ops.push(FieldOp::In(parse_in_list(value)?)),
            "$nin" => ops.push(FieldOp::Nin(parse_in_list(value)?)),
            "$exists" => ops.push(FieldOp::Exists(parse_bool(value)?)),
            "$type" => ops.push(FieldOp::Type(parse_type_list(value)?)),
            "$size" => ops.push(FieldOp::Size(parse_int(value)?)),
            "$elemMatch" => ops.push(FieldOp::ElemMatch(parse_elem_match(value)?)),
            "$all" => ops.push(FieldOp::All(parse_all_list(value)?)),
            other if other.starts_with('$') => {
                return Err(QueryError::Unsupported(format!("query operator: {other}")));
            }
            _ => {
                return Err(QueryError::BadValue(
                    "field names cannot mix with operators".into(),
                ));
            }
        }
    }
    Ok(ops)
}

fn parse_bool(value: &Bson) -> Result<bool> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        _ => Err(QueryError::BadValue("expected a boolean".into())),
    }
}

fn parse_int(value: &Bson) -> Result<i64> {
    match value {
        Bson::Int32(i) => Ok(*i as i64),
        Bson::Int64(i) => Ok(*i),
        Bson::Double(d) if d.fract() == 0.0 => Ok(*d as i64),
        _ => Err(QueryError::BadValue("expected an integer".into())),
    }
}

fn parse_in_list(value: &Bson) -> Result<Vec<InEntry>> {
    let arr = match value {
        Bson::Array(a) => a,
        _ => return Err(QueryError::BadValue("$in/$nin require an array".into())),
    };
    arr.iter()
        .map(|v| match v {
            Bson::RegularExpression(re) => {
                Ok(InEntry::Regex(compile_regex(&re.pattern, &re.options)?))
            }
            other => Ok(InEntry::Value(other.clone())),
        })
        .collect()
}

fn parse_type_list(value: &Bson) -> Result<Vec<i32>> {
    let entries: Vec<&Bson> = match value {
        Bson::Array(a) => a.iter().collect(),
        other => vec![other],
    };
    entries
        .into_iter()
        .map(|v| match v {
            Bson::Int32(i) => Ok(*i),
            Bson::Int64(i) => Ok(*i as i32),
            Bson::String(s) => type_alias_code(s)
                .ok_or_else(|| QueryError::BadValue(format!("unknown $type alias: {s}"))),
            _ => Err(QueryError::BadValue("$type requires a number or string".into())),
        })
        .collect()
}

fn parse_all_list(value: &Bson) -> Result<Vec<AllEntry>> {
    let arr = match value {
        Bson::Array(a) => a,
        _ => return Err(QueryError::BadValue("$all requires an array".into())),
    };
    arr.iter()
        .map(|v| match v {
            Bson::RegularExpression(re) => {
                Ok(AllEntry::Regex(compile_regex(&re.pattern, &re.options)?))
            }
            Bson::Document(d) if d.contains_key("$elemMatch") => {
                let elem_spec = d.get("$elemMatch").unwrap();
                Ok(AllEntry::ElemMatch(parse_elem_match(elem_spec)?))
            }
            other => Ok(AllEntry::Value(other.clone())),
        })
        .collect()
}

fn parse_elem_match(value: &Bson) -> Result<ElemMatchSpec> {
    let doc = match value {
        Bson::Document(d) => d,
        _ => return Err(QueryError::BadValue("$elemMatch requires a document".into())),
    };
    if doc.is_empty() || !is_operator_document(doc) {
        return Ok(ElemMatchSpec::Criteria(Box::new(parse_filter(doc)?)));
    }
    Ok(ElemMatchSpec::Operators(parse_operator_doc(doc)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn empty_filter_is_and_of_nothing() {
        assert_eq!(parse_filter(&doc! {}).unwrap(), Filter::And(vec![]));
    }

    #[test]
    fn implicit_equality() {
        let f = parse_filter(&doc! { "status": "active" }).unwrap();
        assert_eq!(
            f,
            Filter::And(vec![Filter::Field(
                "status".into(),
                FieldPredicate::Eq(Bson::String("active".into()))
            )])
        );
    }

    #[test]
    fn operator_document_parses_multiple_ops() {
        let f = parse_filter(&doc! { "age": { "$gt": 21, "$lte": 65 } }).unwrap();
        match f {
            Filter::And(children) => match &children[0] {
                Filter::Field(_, FieldPredicate::Ops(ops)) => assert_eq!(ops.len(), 2),
                _ => panic!("expected ops"),
            },
            _ => panic!("expected and"),
        }
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = parse_filter(&doc! { "a": { "$bogus": 1 } }).unwrap_err();
        assert!(matches!(err, QueryError::Unsupported(_)));
    }
}
