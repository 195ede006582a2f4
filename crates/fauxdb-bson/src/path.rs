//! Dotted / array-indexed path resolution.

use bson::{Bson, Document};

/// Result of resolving a dotted path against a document.
#[derive(Debug, Clone, PartialEq)]
pub enum PathResolution {
    Missing,
    /// Non-empty list of leaf candidates. More than one entry means an
    /// intermediate array segment fanned out across its elements.
    Existing(Vec<Bson>),
}

impl PathResolution {
    pub fn into_values(self) -> Vec<Bson> {
        match self {
            PathResolution::Missing => Vec::new(),
            PathResolution::Existing(values) => values,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, PathResolution::Missing)
    }
}

/// Resolve a dotted path (`"a.b.c"`) against `doc`.
///
/// When an intermediate segment lands on an array, the resolver fans out:
/// if the segment parses as an integer it indexes that position, otherwise
/// it is applied to every array element that is itself a document. The
/// final leaf is never auto-traversed — an array-valued leaf is returned as
/// a single `Bson::Array` value, not unpacked.
pub fn resolve(doc: &Document, path: &str) -> PathResolution {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current: Vec<Bson> = vec![Bson::Document(doc.clone())];

    for segment in &segments {
        let mut next = Vec::new();
        for node in &current {
            fan_out_segment(node, segment, &mut next);
        }
        if next.is_empty() {
            return PathResolution::Missing;
        }
        current = next;
    }

    PathResolution::Existing(current)
}

fn fan_out_segment(node: &Bson, segment: &str, out: &mut Vec<Bson>) {
    match node {
        Bson::Document(d) => {
            if let Some(v) = d.get(segment) {
                out.push(v.clone());
            }
        }
        Bson::Array(arr) => {
            if let Ok(idx) = segment.parse::<usize>() {
                if let Some(v) = arr.get(idx) {
                    out.push(v.clone());
                }
            } else {
                for elem in arr {
                    if let Bson::Document(d) = elem {
                        if let Some(v) = d.get(segment) {
                            out.push(v.clone());
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathError {
    EmptyPath,
    NotTraversable(String),
    NotAnIndex(String),
    IndexOutOfBounds(usize),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::EmptyPath => write!(f, "path must not be empty"),
            PathError::NotTraversable(seg) => {
                write!(f, "cannot traverse into non-document/array at '{seg}'")
            }
            PathError::NotAnIndex(seg) => write!(f, "'{seg}' is not a valid array index"),
            PathError::IndexOutOfBounds(idx) => write!(f, "array index {idx} out of bounds"),
        }
    }
}

impl std::error::Error for PathError {}

/// Create intermediate documents for missing segments and set the leaf
/// value. Never silently overwrites a non-document/array intermediate —
/// that is a `PathError::NotTraversable`.
pub fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<(), PathError> {
    let segments: Vec<&str> = path.split('.').collect();
    let (head, rest) = segments.split_first().ok_or(PathError::EmptyPath)?;
    if rest.is_empty() {
        doc.insert((*head).to_string(), value);
        return Ok(());
    }
    let child = doc
        .entry((*head).to_string())
        .or_insert_with(|| Bson::Document(Document::new()));
    set_into(child, rest, value)
}

fn set_into(node: &mut Bson, segments: &[&str], value: Bson) -> Result<(), PathError> {
    let (head, rest) = segments.split_first().ok_or(PathError::EmptyPath)?;
    if rest.is_empty() {
        return set_leaf(node, head, value);
    }
    match node {
        Bson::Document(d) => {
            let child = d
                .entry((*head).to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            set_into(child, rest, value)
        }
        Bson::Array(arr) => {
            let idx: usize = head
                .parse()
                .map_err(|_| PathError::NotAnIndex((*head).to_string()))?;
            let child = arr.get_mut(idx).ok_or(PathError::IndexOutOfBounds(idx))?;
            set_into(child, rest, value)
        }
        _ => Err(PathError::NotTraversable((*head).to_string())),
    }
}

fn set_leaf(node: &mut Bson, head: &str, value: Bson) -> Result<(), PathError> {
    match node {
        Bson::Document(d) => {
            d.insert(head.to_string(), value);
            Ok(())
        }
        Bson::Array(arr) => {
            let idx: usize = head
                .parse()
                .map_err(|_| PathError::NotAnIndex(head.to_string()))?;
            if idx < arr.len() {
                arr[idx] = value;
                Ok(())
            } else if idx == arr.len() {
                arr.push(value);
                Ok(())
            } else {
                Err(PathError::IndexOutOfBounds(idx))
            }
        }
        _ => Err(PathError::NotTraversable(head.to_string())),
    }
}

/// Remove the value at `path`. A no-op if any segment along the way is
/// missing.
pub fn remove_path(doc: &mut Document, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, init)) = segments.split_last() else {
        return;
    };
    if init.is_empty() {
        doc.remove(*last);
        return;
    }
    if let Some(parent) = navigate_mut(doc, init) {
        remove_leaf(parent, last);
    }
}

fn navigate_mut<'a>(doc: &'a mut Document, segments: &[&str]) -> Option<&'a mut Bson> {
    let (head, rest) = segments.split_first()?;
    let node = doc.get_mut(*head)?;
    if rest.is_empty() {
        Some(node)
    } else {
        navigate_into_mut(node, rest)
    }
}

fn navigate_into_mut<'a>(node: &'a mut Bson, segments: &[&str]) -> Option<&'a mut Bson> {
    let (head, rest) = segments.split_first()?;
    let next = match node {
        Bson::Document(d) => d.get_mut(*head)?,
        Bson::Array(arr) => {
            let idx: usize = head.parse().ok()?;
            arr.get_mut(idx)?
        }
        _ => return None,
    };
    if rest.is_empty() {
        Some(next)
    } else {
        navigate_into_mut(next, rest)
    }
}

fn remove_leaf(node: &mut Bson, segment: &str) {
    match node {
        Bson::Document(d) => {
            d.remove(segment);
        }
        Bson::Array(arr) => {
            if let Ok(idx) = segment.parse::<usize>() {
                if idx < arr.len() {
                    arr.remove(idx);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn resolves_nested_field() {
        let d = doc! { "a": { "b": 7 } };
        assert_eq!(
            resolve(&d, "a.b"),
            PathResolution::Existing(vec![Bson::Int32(7)])
        );
    }

    #[test]
    fn missing_path_is_missing() {
        let d = doc! { "a": 1 };
        assert_eq!(resolve(&d, "a.b"), PathResolution::Missing);
    }

    #[test]
    fn fans_out_across_array_of_documents() {
        let d = doc! { "items": [ { "q": 1 }, { "q": 2 } ] };
        assert_eq!(
            resolve(&d, "items.q"),
            PathResolution::Existing(vec![Bson::Int32(1), Bson::Int32(2)])
        );
    }

    #[test]
    fn numeric_segment_indexes_array() {
        let d = doc! { "items": [10, 20, 30] };
        assert_eq!(
            resolve(&d, "items.1"),
            PathResolution::Existing(vec![Bson::Int32(20)])
        );
    }

    #[test]
    fn array_leaf_is_not_unpacked() {
        let d = doc! { "tags": ["x", "y"] };
        let r = resolve(&d, "tags");
        assert_eq!(
            r,
            PathResolution::Existing(vec![Bson::Array(vec![
                Bson::String("x".into()),
                Bson::String("y".into())
            ])])
        );
    }

    #[test]
    fn set_path_creates_intermediate_documents() {
        let mut d = Document::new();
        set_path(&mut d, "a.b.c", Bson::Int32(5)).unwrap();
        assert_eq!(resolve(&d, "a.b.c").into_values(), vec![Bson::Int32(5)]);
    }

    #[test]
    fn set_path_rejects_non_document_intermediate() {
        let mut d = doc! { "a": 1 };
        let err = set_path(&mut d, "a.b", Bson::Int32(1)).unwrap_err();
        assert!(matches!(err, PathError::NotTraversable(_)));
    }

    #[test]
    fn remove_path_is_noop_when_missing() {
        let mut d = doc! { "a": 1 };
        remove_path(&mut d, "x.y");
        assert_eq!(d, doc! { "a": 1 });
    }

    #[test]
    fn remove_path_removes_leaf() {
        let mut d = doc! { "a": { "b": 1, "c": 2 } };
        remove_path(&mut d, "a.b");
        assert_eq!(d, doc! { "a": { "c": 2 } });
    }
}
