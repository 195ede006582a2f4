use bson::{Bson, Document};

use crate::error::DispatchError;

/// Wraps a command's result fields with `ok: 1.0`.
pub fn ok_response(mut fields: Document) -> Document {
    fields.insert("ok", Bson::Double(1.0));
    fields
}

/// Shapes a failure as `ok: 0`, `errmsg`, `code`,
/// `codeName`, and `errorLabels` when the error carries any.
pub fn err_response(err: &DispatchError) -> Document {
    let (code, code_name) = err.code();
    let mut doc = Document::new();
    doc.insert("ok", Bson::Double(0.0));
    doc.insert("errmsg", Bson::String(err.to_string()));
    doc.insert("code", Bson::Int32(code));
    doc.insert("codeName", Bson::String(code_name.to_string()));
    let labels = err.labels();
    if !labels.is_empty() {
        doc.insert(
            "errorLabels",
            Bson::Array(labels.into_iter().map(|l| Bson::String(l.to_string())).collect()),
        );
    }
    doc
}

/// A single entry in a `writeErrors` array. Constraint errors abort the
/// entire batch at that failure point for ordered batches").
pub fn write_error(index: usize, err: &DispatchError) -> Document {
    let (code, code_name) = err.code();
    let mut doc = Document::new();
    doc.insert("index", Bson::Int32(index as i32));
    doc.insert("code", Bson::Int32(code));
    doc.insert("codeName", Bson::String(code_name.to_string()));
    doc.insert("errmsg", Bson::String(err.to_string()));
    doc
}
