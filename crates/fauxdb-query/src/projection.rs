//! Projection engine. Determines inclusion/exclusion mode from the
//! projection document and reshapes result documents accordingly.

use bson::{Bson, Document};
use fauxdb_bson::{PathResolution, deep_copy_doc, remove_path, resolve, set_path};
use fauxdb_expr::{Variables, eval as eval_expr};

use crate::error::{QueryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionSpec {
    /// A bare `1`/`true` — project the field as-is.
    Literal,
    /// A computed projection value, e.g. `{full: {$add: [...]}}` or a field
    /// reference like `{alias: "$other.path"}`.
    Expr(fauxdb_expr::Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub mode: ProjectionMode,
    pub fields: Vec<(String, ProjectionSpec)>,
    pub include_id: bool,
}

pub fn parse_projection(doc: &Document) -> Result<Projection> {
    let mut fields = Vec::new();
    let mut include_id = true;
    let mut saw_include = false;
    let mut saw_exclude = false;

    for (key, value) in doc.iter() {
        if key == "_id" {
            match classify(value) {
                Some(true) => {}
                Some(false) => include_id = false,
                None => {
                    saw_include = true;
                    fields.push((key.clone(), ProjectionSpec::Expr(fauxdb_expr::parse_expr(value)?)));
                }
            }
            continue;
        }
        match classify(value) {
            Some(true) => {
                saw_include = true;
                fields.push((key.clone(), ProjectionSpec::Literal));
            }
            Some(false) => {
                saw_exclude = true;
                fields.push((key.clone(), ProjectionSpec::Literal));
            }
            None => {
                saw_include = true;
                fields.push((key.clone(), ProjectionSpec::Expr(fauxdb_expr::parse_expr(value)?)));
            }
        }
    }

    if saw_include && saw_exclude {
        return Err(QueryError::BadValue(
            "projection cannot mix inclusion and exclusion (besides _id)".into(),
        ));
    }

    let mode = if saw_exclude && !saw_include {
        ProjectionMode::Exclude
    } else {
        ProjectionMode::Include
    };

    Ok(Projection {
        mode,
        fields,
        include_id,
    })
}

fn classify(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        Bson::Int32(i) => Some(*i != 0),
        Bson::Int64(i) => Some(*i != 0),
        Bson::Double(d) => Some(*d != 0.0),
        _ => None,
    }
}

pub fn apply_projection(doc: &Document, projection: &Projection) -> Document {
    match projection.mode {
        ProjectionMode::Exclude => {
            let mut out = deep_copy_doc(doc);
            if !projection.include_id {
                out.remove("_id");
            }
            for (path, _) in &projection.fields {
                remove_path(&mut out, path);
            }
            out
        }
        ProjectionMode::Include => {
            let mut out = Document::new();
            if projection.include_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id", id.clone());
                }
            }
            let vars = Variables::new();
            for (path, spec) in &projection.fields {
                if path == "_id" {
                    if let ProjectionSpec::Expr(expr) = spec {
                        if let Some(v) = eval_expr(expr, doc, &vars) {
                            out.insert("_id", v);
                        }
                    }
                    continue;
                }
                match spec {
                    ProjectionSpec::Literal => {
                        if let PathResolution::Existing(values) = resolve(doc, path) {
                            let value = if values.len() == 1 {
                                values.into_iter().next().unwrap()
                            } else {
                                Bson::Array(values)
                            };
                            let _ = set_path(&mut out, path, value);
                        }
                    }
                    ProjectionSpec::Expr(expr) => {
                        if let Some(v) = eval_expr(expr, doc, &vars) {
                            let _ = set_path(&mut out, path, v);
                        }
                    }
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn inclusion_keeps_id_by_default() {
        let d = doc! { "_id": 1, "a": 1, "b": 2 };
        let p = parse_projection(&doc! { "a": 1 }).unwrap();
        let out = apply_projection(&d, &p);
        assert_eq!(out, doc! { "_id": 1, "a": 1 });
    }

    #[test]
    fn exclusion_drops_named_fields() {
        let d = doc! { "_id": 1, "a": 1, "b": 2 };
        let p = parse_projection(&doc! { "b": 0 }).unwrap();
        let out = apply_projection(&d, &p);
        assert_eq!(out, doc! { "_id": 1, "a": 1 });
    }

    #[test]
    fn exclude_id_in_inclusion_mode() {
        let d = doc! { "_id": 1, "a": 1 };
        let p = parse_projection(&doc! { "_id": 0, "a": 1 }).unwrap();
        let out = apply_projection(&d, &p);
        assert_eq!(out, doc! { "a": 1 });
    }

    #[test]
    fn rejects_mixed_inclusion_and_exclusion() {
        assert!(parse_projection(&doc! { "a": 1, "b": 0 }).is_err());
    }

    #[test]
    fn computed_field_evaluates_expression() {
        let d = doc! { "price": 10, "qty": 2 };
        let p = parse_projection(&doc! { "total": { "$add": ["$price", "$qty"] } }).unwrap();
        let out = apply_projection(&d, &p);
        assert_eq!(out.get_i64("total").unwrap(), 12);
    }
}
