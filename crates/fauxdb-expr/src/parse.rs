use bson::Bson;

use crate::expr::{Expression, ExprParseError};

/// Parse any BSON value into an [`Expression`]. Follows MongoDB's own
/// dispatch rule: a string starting with `$$` is a variable reference, one
/// starting with a single `$` is a field path, a document whose sole key is
/// a known operator is an operator expression, any other document is an
/// object-construction expression, an array is an array-construction
/// expression, and everything else is a literal.
pub fn parse_expr(value: &Bson) -> Result<Expression, ExprParseError> {
    match value {
        Bson::String(s) if s.starts_with("$$") => Ok(parse_variable(s)),
        Bson::String(s) if s.starts_with('$') => Ok(Expression::FieldPath(s[1..].to_string())),
        Bson::Document(doc) => parse_document_expr(doc),
        Bson::Array(items) => {
            let parsed = items.iter().map(parse_expr).collect::<Result<_, _>>()?;
            Ok(Expression::Array(parsed))
        }
        other => Ok(Expression::Literal(other.clone())),
    }
}

fn parse_variable(s: &str) -> Expression {
    let body = &s[2..];
    match body.split_once('.') {
        Some((name, rest)) => Expression::Variable {
            name: name.to_string(),
            rest: Some(rest.to_string()),
        },
        None => Expression::Variable {
            name: body.to_string(),
            rest: None,
        },
    }
}

fn parse_document_expr(doc: &bson::Document) -> Result<Expression, ExprParseError> {
    if doc.len() == 1 {
        let (key, value) = doc.iter().next().unwrap();
        if key.starts_with('$') {
            return parse_operator(key, value);
        }
    }
    let mut fields = Vec::with_capacity(doc.len());
    for (k, v) in doc.iter() {
        fields.push((k.clone(), parse_expr(v)?));
    }
    Ok(Expression::Object(fields))
}

fn parse_operator(op: &str, value: &Bson) -> Result<Expression, ExprParseError> {
    match op {
        "$literal" => Ok(Expression::Literal(value.clone())),
        "$and" => Ok(Expression::And(parse_operand_list(value)?)),
        "$or" => Ok(Expression::Or(parse_operand_list(value)?)),
        "$not" => {
            let operands = parse_operand_list(value)?;
            if operands.len() != 1 {
                return Err(ExprParseError("$not takes exactly one operand".into()));
            }
            Ok(Expression::Not(Box::new(operands.into_iter().next().unwrap())))
        }
        "$add" => Ok(Expression::Add(parse_operand_list(value)?)),
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let operands = parse_operand_list(value)?;
            if operands.len() != 2 {
                return Err(ExprParseError(format!("{op} takes exactly two operands")));
            }
            let mut it = operands.into_iter();
            let lhs = Box::new(it.next().unwrap());
            let rhs = Box::new(it.next().unwrap());
            Ok(match op {
                "$eq" => Expression::Eq(lhs, rhs),
                "$ne" => Expression::Ne(lhs, rhs),
                "$gt" => Expression::Gt(lhs, rhs),
                "$gte" => Expression::Gte(lhs, rhs),
                "$lt" => Expression::Lt(lhs, rhs),
                "$lte" => Expression::Lte(lhs, rhs),
                _ => unreachable!(),
            })
        }
        other => Err(ExprParseError(format!("unsupported expression operator: {other}"))),
    }
}

/// Operands may be given as an array (`{ $add: [a, b] }`) or, for
/// naturally-binary/list operators, a bare single value.
fn parse_operand_list(value: &Bson) -> Result<Vec<Expression>, ExprParseError> {
    match value {
        Bson::Array(items) => items.iter().map(parse_expr).collect(),
        other => Ok(vec![parse_expr(other)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_field_path() {
        assert_eq!(
            parse_expr(&Bson::String("$a.b".into())).unwrap(),
            Expression::FieldPath("a.b".into())
        );
    }

    #[test]
    fn parses_root_variable() {
        assert_eq!(
            parse_expr(&Bson::String("$$ROOT".into())).unwrap(),
            Expression::Variable {
                name: "ROOT".into(),
                rest: None
            }
        );
    }

    #[test]
    fn parses_eq_operator() {
        let e = parse_expr(&bson::bson!({ "$eq": ["$a", 1] })).unwrap();
        assert!(matches!(e, Expression::Eq(_, _)));
    }

    #[test]
    fn parses_object_construction() {
        let e = parse_expr(&bson::Bson::Document(doc! { "x": "$a", "y": 2 })).unwrap();
        match e {
            Expression::Object(fields) => assert_eq!(fields.len(), 2),
            _ => panic!("expected object expression"),
        }
    }
}
