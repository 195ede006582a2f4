use std::collections::HashMap;

use bson::{Bson, Document};
use fauxdb_bson::{Collation, PathResolution, compare_values, deep_copy, deep_copy_doc, resolve, set_path, value_equals};
use fauxdb_expr::{Expression, Variables, eval as eval_expr};
use fauxdb_query::{apply_projection, matches};

use crate::accumulate::{expression_of, fold, finalize, init_state};
use crate::error::{AggregateError, Result};
use crate::resolver::CollectionResolver;
use crate::stage::{GraphLookupSpec, LookupSpec, Stage, UnionWithSpec, parse_pipeline};

/// Run a full pipeline over the given input documents.
pub fn run_pipeline(input: Vec<Document>, stages: &[Stage], resolver: &dyn CollectionResolver) -> Result<Vec<Document>> {
    let mut docs = input;
    for stage in stages {
        docs = run_stage(docs, stage, resolver)?;
    }
    Ok(docs)
}

fn run_stage(docs: Vec<Document>, stage: &Stage, resolver: &dyn CollectionResolver) -> Result<Vec<Document>> {
    let collation = Collation::simple();
    match stage {
        Stage::Match(filter) => Ok(docs.into_iter().filter(|d| matches(d, filter, &collation)).collect()),
        Stage::Project(projection) => Ok(docs.iter().map(|d| apply_projection(d, projection)).collect()),
        Stage::AddFields(assignments) => Ok(docs
            .iter()
            .map(|d| {
                let mut result = deep_copy_doc(d);
                let vars = Variables::new();
                for (path, expr) in assignments {
                    if let Some(v) = eval_expr(expr, &result, &vars) {
                        let _ = set_path(&mut result, path, v);
                    }
                }
                result
            })
            .collect()),
        Stage::UnsetFields(fields) => Ok(docs
            .iter()
            .map(|d| {
                let mut result = deep_copy_doc(d);
                for path in fields {
                    fauxdb_bson::remove_path(&mut result, path);
                }
                result
            })
            .collect()),
        Stage::Sort(keys) => {
            let mut sorted = docs;
            sorted.sort_by(|a, b| {
                for (path, dir) in keys {
                    let av = resolve_first(a, path);
                    let bv = resolve_first(b, path);
                    let ord = compare_values(&av, &bv);
                    if ord != std::cmp::Ordering::Equal {
                        return if *dir < 0 { ord.reverse() } else { ord };
                    }
                }
                std::cmp::Ordering::Equal
            });
            Ok(sorted)
        }
        Stage::Limit(n) => Ok(docs.into_iter().take(*n as usize).collect()),
        Stage::Skip(n) => Ok(docs.into_iter().skip(*n as usize).collect()),
        Stage::Unwind {
            path,
            preserve_null_and_empty,
        } => {
            let mut out = Vec::new();
            for doc in docs {
                match resolve(&doc, path) {
                    PathResolution::Missing => {
                        if *preserve_null_and_empty {
                            out.push(doc);
                        }
                    }
                    PathResolution::Existing(values) => {
                        let value = values.into_iter().next().unwrap_or(Bson::Null);
                        match value {
                            Bson::Null => {
                                if *preserve_null_and_empty {
                                    out.push(doc);
                                }
                            }
                            Bson::Array(items) => {
                                if items.is_empty() {
                                    if *preserve_null_and_empty {
                                        let mut d = deep_copy_doc(&doc);
                                        fauxdb_bson::remove_path(&mut d, path);
                                        out.push(d);
                                    }
                                } else {
                                    for item in items {
                                        let mut d = deep_copy_doc(&doc);
                                        let _ = set_path(&mut d, path, item);
                                        out.push(d);
                                    }
                                }
                            }
                            scalar => {
                                let mut d = deep_copy_doc(&doc);
                                let _ = set_path(&mut d, path, scalar);
                                out.push(d);
                            }
                        }
                    }
                }
            }
            Ok(out)
        }
        Stage::Count(field) => {
            if docs.is_empty() {
                Ok(Vec::new())
            } else {
                let mut out = Document::new();
                out.insert(field.clone(), Bson::Int64(docs.len() as i64));
                Ok(vec![out])
            }
        }
        Stage::Group { id_expr, accumulators } => run_group(&docs, id_expr, accumulators),
        Stage::SortByCount(expr) => run_sort_by_count(&docs, expr),
        Stage::ReplaceRoot(expr) => docs
            .iter()
            .map(|d| {
                let vars = Variables::new();
                match eval_expr(expr, d, &vars) {
                    Some(Bson::Document(new_root)) => Ok(new_root),
                    _ => Err(AggregateError::BadValue(
                        "$replaceRoot/$replaceWith must evaluate to a document".into(),
                    )),
                }
            })
            .collect(),
        Stage::Facet(facets) => {
            let mut out = Document::new();
            for (name, sub_stages) in facets {
                let result = run_pipeline(docs.clone(), sub_stages, resolver)?;
                out.insert(name.clone(), Bson::Array(result.into_iter().map(Bson::Document).collect()));
            }
            Ok(vec![out])
        }
        Stage::Lookup(spec) => run_lookup(&docs, spec, resolver),
        Stage::UnionWith(spec) => run_union_with(docs, spec, resolver),
        Stage::GraphLookup(spec) => run_graph_lookup(&docs, spec, resolver),
    }
}

fn resolve_first(doc: &Document, path: &str) -> Bson {
    match resolve(doc, path) {
        PathResolution::Missing => Bson::Null,
        PathResolution::Existing(values) => values.into_iter().next().unwrap_or(Bson::Null),
    }
}

fn run_group(docs: &[Document], id_expr: &Expression, accumulators: &[(String, crate::accumulate::Accumulator)]) -> Result<Vec<Document>> {
    struct Group {
        id: Bson,
        states: Vec<crate::accumulate::AccState>,
    }

    let mut groups: Vec<Group> = Vec::new();
    let vars = Variables::new();

    for doc in docs {
        let key = eval_expr(id_expr, doc, &vars).unwrap_or(Bson::Null);
        let idx = match groups.iter().position(|g| value_equals(&g.id, &key)) {
            Some(i) => i,
            None => {
                groups.push(Group {
                    id: key.clone(),
                    states: accumulators.iter().map(|(_, acc)| init_state(acc)).collect(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        for (state, (_, acc)) in group.states.iter_mut().zip(accumulators.iter()) {
            let value = eval_expr(expression_of(acc), doc, &vars);
            fold(state, value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|g| {
            let mut out = Document::new();
            out.insert("_id", g.id);
            for (state, (name, _)) in g.states.into_iter().zip(accumulators.iter()) {
                out.insert(name.clone(), finalize(state));
            }
            out
        })
        .collect())
}

fn run_sort_by_count(docs: &[Document], expr: &Expression) -> Result<Vec<Document>> {
    let vars = Variables::new();
    let mut counts: Vec<(Bson, i64)> = Vec::new();
    for doc in docs {
        let key = eval_expr(expr, doc, &vars).unwrap_or(Bson::Null);
        match counts.iter().position(|(k, _)| value_equals(k, &key)) {
            Some(i) => counts[i].1 += 1,
            None => counts.push((key, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| compare_values(&a.0, &b.0)));
    Ok(counts
        .into_iter()
        .map(|(id, count)| {
            let mut d = Document::new();
            d.insert("_id", id);
            d.insert("count", Bson::Int64(count));
            d
        })
        .collect())
}

fn values_join(local: &Bson, foreign: &Bson) -> bool {
    let locals: Vec<&Bson> = match local {
        Bson::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let foreigns: Vec<&Bson> = match foreign {
        Bson::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    locals.iter().any(|l| foreigns.iter().any(|f| value_equals(l, f)))
}

fn run_lookup(docs: &[Document], spec: &LookupSpec, resolver: &dyn CollectionResolver) -> Result<Vec<Document>> {
    let foreign_docs = resolver
        .resolve(&spec.from)
        .ok_or_else(|| AggregateError::Unsupported(format!("$lookup from unknown collection: {}", spec.from)))?;

    if let Some(pipeline_docs) = &spec.pipeline {
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            let mut vars: HashMap<String, Bson> = HashMap::new();
            let root_vars = Variables::new();
            for (name, expr) in &spec.let_vars {
                if let Some(v) = eval_expr(expr, doc, &root_vars) {
                    vars.insert(name.clone(), v);
                }
            }
            let substituted: Vec<Document> = pipeline_docs
                .iter()
                .map(|d| match substitute_vars(&Bson::Document(d.clone()), &vars) {
                    Bson::Document(d) => d,
                    _ => d.clone(),
                })
                .collect();
            let stages = parse_pipeline(&substituted)?;
            let result = run_pipeline(foreign_docs.clone(), &stages, resolver)?;
            let mut new_doc = deep_copy_doc(doc);
            new_doc.insert(
                spec.as_field.clone(),
                Bson::Array(result.into_iter().map(Bson::Document).collect()),
            );
            out.push(new_doc);
        }
        return Ok(out);
    }

    let local_field = spec.local_field.as_ref().unwrap();
    let foreign_field = spec.foreign_field.as_ref().unwrap();
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let local_val = resolve_joined(doc, local_field);
        let matched: Vec<Bson> = foreign_docs
            .iter()
            .filter(|fd| values_join(&local_val, &resolve_joined(fd, foreign_field)))
            .map(|fd| Bson::Document(fd.clone()))
            .collect();
        let mut new_doc = deep_copy_doc(doc);
        new_doc.insert(spec.as_field.clone(), Bson::Array(matched));
        out.push(new_doc);
    }
    Ok(out)
}

fn resolve_joined(doc: &Document, path: &str) -> Bson {
    match resolve(doc, path) {
        PathResolution::Missing => Bson::Null,
        PathResolution::Existing(values) => {
            if values.len() == 1 {
                values.into_iter().next().unwrap()
            } else {
                Bson::Array(values)
            }
        }
    }
}

fn run_union_with(mut docs: Vec<Document>, spec: &UnionWithSpec, resolver: &dyn CollectionResolver) -> Result<Vec<Document>> {
    let foreign_docs = resolver
        .resolve(&spec.collection)
        .ok_or_else(|| AggregateError::Unsupported(format!("$unionWith from unknown collection: {}", spec.collection)))?;
    let appended = match &spec.pipeline {
        Some(stages) => run_pipeline(foreign_docs, stages, resolver)?,
        None => foreign_docs,
    };
    docs.extend(appended);
    Ok(docs)
}

fn run_graph_lookup(docs: &[Document], spec: &GraphLookupSpec, resolver: &dyn CollectionResolver) -> Result<Vec<Document>> {
    let foreign_docs = resolver
        .resolve(&spec.from)
        .ok_or_else(|| AggregateError::Unsupported(format!("$graphLookup from unknown collection: {}", spec.from)))?;

    let vars = Variables::new();
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let seed = eval_expr(&spec.start_with, doc, &vars).unwrap_or(Bson::Null);
        let mut frontier = flatten(seed);
        let mut visited: Vec<Document> = Vec::new();
        let mut depth: u64 = 0;

        loop {
            if frontier.is_empty() {
                break;
            }
            if let Some(max) = spec.max_depth {
                if depth > max {
                    break;
                }
            }
            let mut matched_round = Vec::new();
            for fd in &foreign_docs {
                let to_val = resolve_joined(fd, &spec.connect_to_field);
                if frontier.iter().any(|seed| values_join(seed, &to_val))
                    && !visited.iter().any(|v| value_equals(&Bson::Document(v.clone()), &Bson::Document(fd.clone())))
                {
                    visited.push(fd.clone());
                    matched_round.push(fd.clone());
                }
            }
            if matched_round.is_empty() {
                break;
            }
            frontier = matched_round
                .iter()
                .flat_map(|d| flatten(resolve_joined(d, &spec.connect_from_field)))
                .collect();
            depth += 1;
        }

        let mut new_doc = deep_copy(&Bson::Document(doc.clone()));
        if let Bson::Document(d) = &mut new_doc {
            d.insert(spec.as_field.clone(), Bson::Array(visited.into_iter().map(Bson::Document).collect()));
        }
        match new_doc {
            Bson::Document(d) => out.push(d),
            _ => unreachable!(),
        }
    }
    Ok(out)
}

fn flatten(value: Bson) -> Vec<Bson> {
    match value {
        Bson::Array(items) => items,
        other => vec![other],
    }
}

/// Substitutes `$$name`/`$$name.rest` references with `let`-bound values in
/// a deep copy of a sub-pipeline document, per the `$lookup` pipeline+let
/// form. `$$ROOT`/`$$CURRENT` are left untouched — they resolve against the
/// inner pipeline's own documents at evaluation time, not the outer scope.
fn substitute_vars(value: &Bson, vars: &HashMap<String, Bson>) -> Bson {
    match value {
        Bson::String(s) if s.starts_with("$$") => {
            let path = &s[2..];
            let (name, rest) = match path.split_once('.') {
                Some((n, r)) => (n, Some(r)),
                None => (path, None),
            };
            if name == "ROOT" || name == "CURRENT" {
                return value.clone();
            }
            match vars.get(name) {
                Some(v) => match rest {
                    Some(r) => navigate(v, r).unwrap_or(Bson::Null),
                    None => v.clone(),
                },
                None => value.clone(),
            }
        }
        Bson::Document(d) => Bson::Document(d.iter().map(|(k, v)| (k.clone(), substitute_vars(v, vars))).collect()),
        Bson::Array(items) => Bson::Array(items.iter().map(|v| substitute_vars(v, vars)).collect()),
        other => other.clone(),
    }
}

fn navigate(value: &Bson, path: &str) -> Option<Bson> {
    let mut current = value.clone();
    for segment in path.split('.') {
        match current {
            Bson::Document(d) => current = d.get(segment)?.clone(),
            _ => return None,
        }
    }
    Some(current)
}
