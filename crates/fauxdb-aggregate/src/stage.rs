use bson::{Bson, Document};
use fauxdb_expr::{Expression, parse_expr};
use fauxdb_query::{Filter, Projection, parse_filter, parse_projection};

use crate::accumulate::{Accumulator, parse_accumulator};
use crate::error::{AggregateError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Project(Projection),
    Group {
        id_expr: Expression,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, i8)>),
    Limit(i64),
    Skip(i64),
    Unwind {
        path: String,
        preserve_null_and_empty: bool,
    },
    Count(String),
    AddFields(Vec<(String, Expression)>),
    UnsetFields(Vec<String>),
    SortByCount(Expression),
    ReplaceRoot(Expression),
    Facet(Vec<(String, Vec<Stage>)>),
    Lookup(LookupSpec),
    UnionWith(UnionWithSpec),
    GraphLookup(GraphLookupSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupSpec {
    pub from: String,
    pub as_field: String,
    pub local_field: Option<String>,
    pub foreign_field: Option<String>,
    pub let_vars: Vec<(String, Expression)>,
    /// Unparsed — substituted with `let` bindings per outer document, then
    /// parsed fresh for each execution (see `exec::run_lookup`).
    pub pipeline: Option<Vec<Document>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionWithSpec {
    pub collection: String,
    pub pipeline: Option<Vec<Stage>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphLookupSpec {
    pub from: String,
    pub start_with: Expression,
    pub connect_from_field: String,
    pub connect_to_field: String,
    pub as_field: String,
    pub max_depth: Option<u64>,
}

pub fn parse_pipeline(stages: &[Document]) -> Result<Vec<Stage>> {
    stages.iter().map(parse_stage).collect()
}

pub fn parse_stage(doc: &Document) -> Result<Stage> {
    if doc.len() != 1 {
        return Err(AggregateError::BadValue(
            "each pipeline stage must have exactly one operator".into(),
        ));
    }
    let (op, value) = doc.iter().next().unwrap();
    match op.as_str() {
        "$match" => Ok(Stage::Match(parse_filter(as_document(value, "$match")?)?)),
        "$project" => {
            let spec = as_document(value, "$project")?;
            if spec.is_empty() {
                return Err(AggregateError::BadValue("$project cannot be empty".into()));
            }
            Ok(Stage::Project(parse_projection(spec)?))
        }
        "$group" => parse_group(as_document(value, "$group")?),
        "$sort" => Ok(Stage::Sort(parse_sort_keys(as_document(value, "$sort")?)?)),
        "$limit" => Ok(Stage::Limit(parse_non_negative(value, "$limit")?)),
        "$skip" => Ok(Stage::Skip(parse_non_negative(value, "$skip")?)),
        "$unwind" => parse_unwind(value),
        "$count" => parse_count(value),
        "$addFields" | "$set" => Ok(Stage::AddFields(parse_assignments(as_document(value, op)?)?)),
        "$unset" => Ok(Stage::UnsetFields(parse_unset_fields(value)?)),
        "$sortByCount" => Ok(Stage::SortByCount(
            parse_expr(value).map_err(|e| AggregateError::BadValue(e.to_string()))?,
        )),
        "$replaceRoot" => {
            let doc = as_document(value, "$replaceRoot")?;
            let new_root = doc
                .get("newRoot")
                .ok_or_else(|| AggregateError::BadValue("$replaceRoot requires newRoot".into()))?;
            Ok(Stage::ReplaceRoot(
                parse_expr(new_root).map_err(|e| AggregateError::BadValue(e.to_string()))?,
            ))
        }
        "$replaceWith" => Ok(Stage::ReplaceRoot(
            parse_expr(value).map_err(|e| AggregateError::BadValue(e.to_string()))?,
        )),
        "$facet" => parse_facet(as_document(value, "$facet")?),
        "$lookup" => parse_lookup(as_document(value, "$lookup")?),
        "$unionWith" => parse_union_with(value),
        "$graphLookup" => parse_graph_lookup(as_document(value, "$graphLookup")?),
        other => Err(AggregateError::Unsupported(format!("pipeline stage: {other}"))),
    }
}

fn as_document<'a>(value: &'a Bson, ctx: &str) -> Result<&'a Document> {
    match value {
        Bson::Document(d) => Ok(d),
        _ => Err(AggregateError::BadValue(format!("{ctx} requires a document"))),
    }
}

fn parse_non_negative(value: &Bson, ctx: &str) -> Result<i64> {
    let n = match value {
        Bson::Int32(i) => *i as i64,
        Bson::Int64(i) => *i,
        Bson::Double(d) if d.fract() == 0.0 => *d as i64,
        _ => return Err(AggregateError::BadValue(format!("{ctx} requires an integer"))),
    };
    if n < 0 {
        return Err(AggregateError::BadValue(format!("{ctx} requires a non-negative integer")));
    }
    Ok(n)
}

fn parse_group(doc: &Document) -> Result<Stage> {
    let id_value = doc
        .get("_id")
        .ok_or_else(|| AggregateError::BadValue("$group requires _id".into()))?;
    let id_expr = parse_expr(id_value).map_err(|e| AggregateError::BadValue(e.to_string()))?;

    let mut accumulators = Vec::new();
    for (key, value) in doc.iter() {
        if key == "_id" {
            continue;
        }
        let spec = as_document(value, "accumulator")?;
        if spec.len() != 1 {
            return Err(AggregateError::BadValue(format!(
                "accumulator for '{key}' must have exactly one operator"
            )));
        }
        let (op, operand) = spec.iter().next().unwrap();
        let expr = parse_expr(operand).map_err(|e| AggregateError::BadValue(e.to_string()))?;
        accumulators.push((key.clone(), parse_accumulator(op, expr)?));
    }
    Ok(Stage::Group { id_expr, accumulators })
}

fn parse_sort_keys(doc: &Document) -> Result<Vec<(String, i8)>> {
    doc.iter()
        .map(|(k, v)| {
            let dir = match v {
                Bson::Int32(1) | Bson::Int64(1) => 1,
                Bson::Int32(-1) | Bson::Int64(-1) => -1,
                _ => return Err(AggregateError::BadValue("$sort directions must be 1 or -1".into())),
            };
            Ok((k.clone(), dir))
        })
        .collect()
}

fn parse_unwind(value: &Bson) -> Result<Stage> {
    match value {
        Bson::String(s) => Ok(Stage::Unwind {
            path: s.trim_start_matches('$').to_string(),
            preserve_null_and_empty: false,
        }),
        Bson::Document(d) => {
            if d.contains_key("includeArrayIndex") {
                return Err(AggregateError::Unsupported("$unwind includeArrayIndex".into()));
            }
            let path = match d.get("path") {
                Some(Bson::String(s)) => s.trim_start_matches('$').to_string(),
                _ => return Err(AggregateError::BadValue("$unwind requires a path".into())),
            };
            let preserve = matches!(d.get("preserveNullAndEmptyArrays"), Some(Bson::Boolean(true)));
            Ok(Stage::Unwind {
                path,
                preserve_null_and_empty: preserve,
            })
        }
        _ => Err(AggregateError::BadValue("$unwind requires a string or document".into())),
    }
}

fn parse_count(value: &Bson) -> Result<Stage> {
    let field = match value {
        Bson::String(s) => s.clone(),
        _ => return Err(AggregateError::BadValue("$count requires a string".into())),
    };
    if field.is_empty() || field.starts_with('$') {
        return Err(AggregateError::BadValue(
            "$count field name must be non-empty and not $-prefixed".into(),
        ));
    }
    Ok(Stage::Count(field))
}

fn parse_assignments(doc: &Document) -> Result<Vec<(String, Expression)>> {
    doc.iter()
        .map(|(k, v)| {
            let expr = parse_expr(v).map_err(|e| AggregateError::BadValue(e.to_string()))?;
            Ok((k.clone(), expr))
        })
        .collect()
}

fn parse_unset_fields(value: &Bson) -> Result<Vec<String>> {
    match value {
        Bson::String(s) => Ok(vec![s.clone()]),
        Bson::Array(items) => items
            .iter()
            .map(|v| match v {
                Bson::String(s) => Ok(s.clone()),
                _ => Err(AggregateError::BadValue("$unset array entries must be strings".into())),
            })
            .collect(),
        _ => Err(AggregateError::BadValue("$unset requires a string or array".into())),
    }
}

fn parse_facet(doc: &Document) -> Result<Stage> {
    let mut facets = Vec::new();
    for (name, value) in doc.iter() {
        let sub = match value {
            Bson::Array(items) => items
                .iter()
                .map(|v| as_document(v, "$facet stage").and_then(parse_stage))
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(AggregateError::BadValue(format!("facet '{name}' requires a pipeline array"))),
        };
        facets.push((name.clone(), sub));
    }
    Ok(Stage::Facet(facets))
}

fn parse_lookup(doc: &Document) -> Result<Stage> {
    let from = match doc.get("from") {
        Some(Bson::String(s)) => s.clone(),
        _ => return Err(AggregateError::BadValue("$lookup requires from".into())),
    };
    let as_field = match doc.get("as") {
        Some(Bson::String(s)) => s.clone(),
        _ => return Err(AggregateError::BadValue("$lookup requires as".into())),
    };

    if let Some(pipeline_val) = doc.get("pipeline") {
        let pipeline_docs = match pipeline_val {
            Bson::Array(items) => items
                .iter()
                .map(|v| match v {
                    Bson::Document(d) => Ok(d.clone()),
                    _ => Err(AggregateError::BadValue("$lookup pipeline entries must be documents".into())),
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(AggregateError::BadValue("$lookup pipeline must be an array".into())),
        };
        let let_vars = match doc.get("let") {
            Some(Bson::Document(d)) => d
                .iter()
                .map(|(k, v)| {
                    let expr = parse_expr(v).map_err(|e| AggregateError::BadValue(e.to_string()))?;
                    Ok((k.clone(), expr))
                })
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };
        return Ok(Stage::Lookup(LookupSpec {
            from,
            as_field,
            local_field: None,
            foreign_field: None,
            let_vars,
            pipeline: Some(pipeline_docs),
        }));
    }

    let local_field = match doc.get("localField") {
        Some(Bson::String(s)) => s.clone(),
        _ => return Err(AggregateError::BadValue("$lookup requires localField".into())),
    };
    let foreign_field = match doc.get("foreignField") {
        Some(Bson::String(s)) => s.clone(),
        _ => return Err(AggregateError::BadValue("$lookup requires foreignField".into())),
    };
    Ok(Stage::Lookup(LookupSpec {
        from,
        as_field,
        local_field: Some(local_field),
        foreign_field: Some(foreign_field),
        let_vars: Vec::new(),
        pipeline: None,
    }))
}

fn parse_union_with(value: &Bson) -> Result<Stage> {
    match value {
        Bson::String(s) => Ok(Stage::UnionWith(UnionWithSpec {
            collection: s.clone(),
            pipeline: None,
        })),
        Bson::Document(d) => {
            let collection = match d.get("coll") {
                Some(Bson::String(s)) => s.clone(),
                _ => return Err(AggregateError::BadValue("$unionWith requires coll".into())),
            };
            let pipeline = match d.get("pipeline") {
                Some(Bson::Array(items)) => {
                    let docs: Result<Vec<Document>> = items
                        .iter()
                        .map(|v| match v {
                            Bson::Document(d) => Ok(d.clone()),
                            _ => Err(AggregateError::BadValue("$unionWith pipeline entries must be documents".into())),
                        })
                        .collect();
                    Some(parse_pipeline(&docs?)?)
                }
                _ => None,
            };
            Ok(Stage::UnionWith(UnionWithSpec { collection, pipeline }))
        }
        _ => Err(AggregateError::BadValue("$unionWith requires a string or document".into())),
    }
}

fn parse_graph_lookup(doc: &Document) -> Result<Stage> {
    let allowed = ["from", "startWith", "connectFromField", "connectToField", "as", "maxDepth"];
    for key in doc.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(AggregateError::Unsupported(format!("$graphLookup option: {key}")));
        }
    }
    let from = match doc.get("from") {
        Some(Bson::String(s)) => s.clone(),
        _ => return Err(AggregateError::BadValue("$graphLookup requires from".into())),
    };
    let start_with = doc
        .get("startWith")
        .ok_or_else(|| AggregateError::BadValue("$graphLookup requires startWith".into()))?;
    let start_with = parse_expr(start_with).map_err(|e| AggregateError::BadValue(e.to_string()))?;
    let connect_from_field = match doc.get("connectFromField") {
        Some(Bson::String(s)) => s.clone(),
        _ => return Err(AggregateError::BadValue("$graphLookup requires connectFromField".into())),
    };
    let connect_to_field = match doc.get("connectToField") {
        Some(Bson::String(s)) => s.clone(),
        _ => return Err(AggregateError::BadValue("$graphLookup requires connectToField".into())),
    };
    let as_field = match doc.get("as") {
        Some(Bson::String(s)) => s.clone(),
        _ => return Err(AggregateError::BadValue("$graphLookup requires as".into())),
    };
    let max_depth = match doc.get("maxDepth") {
        None => None,
        Some(Bson::Int32(i)) if *i >= 0 => Some(*i as u64),
        Some(Bson::Int64(i)) if *i >= 0 => Some(*i as u64),
        _ => return Err(AggregateError::BadValue("maxDepth must be a non-negative integer".into())),
    };
    Ok(Stage::GraphLookup(GraphLookupSpec {
        from,
        start_with,
        connect_from_field,
        connect_to_field,
        as_field,
        max_depth,
    }))
}
