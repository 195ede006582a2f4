//! Canonical comparison, equality and copy semantics for BSON values.
//!
//! `bson::Bson` already gives us the tagged-union representation the spec
//! calls for; this module adds the cross-type numeric family and the
//! canonical type ordering MongoDB's query/sort engine uses on top of it.

use std::cmp::Ordering;

use bson::Bson;
use bson::spec::ElementType;

/// Canonical BSON type ordering used for cross-type comparisons and sorts.
///
/// Follows the documented MongoDB order with the numeric family collapsed
/// into a single rank: MinKey < Null < Number < String < Document < Array <
/// Binary < ObjectId < Boolean < DateTime < Regex < everything else.
fn type_ordinal(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        _ => 12,
    }
}

/// MongoDB `$type` numeric codes, exposed so the matcher can share this table
/// rather than re-deriving it.
pub fn type_code(value: &Bson) -> i32 {
    match value.element_type() {
        ElementType::Double => 1,
        ElementType::String => 2,
        ElementType::EmbeddedDocument => 3,
        ElementType::Array => 4,
        ElementType::Binary => 5,
        ElementType::Undefined => 6,
        ElementType::ObjectId => 7,
        ElementType::Boolean => 8,
        ElementType::DateTime => 9,
        ElementType::Null => 10,
        ElementType::RegularExpression => 11,
        ElementType::DbPointer => 12,
        ElementType::JavaScriptCode => 13,
        ElementType::Symbol => 14,
        ElementType::JavaScriptCodeWithScope => 15,
        ElementType::Int32 => 16,
        ElementType::Timestamp => 17,
        ElementType::Int64 => 18,
        ElementType::Decimal128 => 19,
        ElementType::MaxKey => 127,
        ElementType::MinKey => -1,
    }
}

/// String aliases accepted by `$type`, mapped to their numeric code.
pub fn type_alias_code(alias: &str) -> Option<i32> {
    Some(match alias {
        "double" => 1,
        "string" => 2,
        "object" => 3,
        "array" => 4,
        "binData" => 5,
        "undefined" => 6,
        "objectId" => 7,
        "bool" => 8,
        "date" => 9,
        "null" => 10,
        "regex" => 11,
        "dbPointer" => 12,
        "javascript" => 13,
        "symbol" => 14,
        "javascriptWithScope" => 15,
        "int" => 16,
        "timestamp" => 17,
        "long" => 18,
        "decimal" => 19,
        "number" => -2, // synthetic: matches any of the numeric family
        "minKey" => -1,
        "maxKey" => 127,
        _ => return None,
    })
}

/// Does `value`'s `$type` match the requested numeric code (or the
/// synthetic `-2` "number" alias)?
pub fn matches_type_code(value: &Bson, code: i32) -> bool {
    if code == -2 {
        return is_numeric(value);
    }
    type_code(value) == code
}

fn is_numeric(value: &Bson) -> bool {
    matches!(
        value,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
    )
}

/// Produce an independent copy of `value`. Arrays/documents are copied
/// element-wise / key-by-key; `Bson` is already a value type with no shared
/// interior mutability, so this is a structural clone, but kept as an
/// explicit named operation to match the spec's contract and give callers a
/// single place to reason about isolation.
pub fn deep_copy(value: &Bson) -> Bson {
    match value {
        Bson::Array(items) => Bson::Array(items.iter().map(deep_copy).collect()),
        Bson::Document(doc) => {
            let mut copy = bson::Document::new();
            for (k, v) in doc.iter() {
                copy.insert(k.clone(), deep_copy(v));
            }
            Bson::Document(copy)
        }
        other => other.clone(),
    }
}

pub fn deep_copy_doc(doc: &bson::Document) -> bson::Document {
    let mut copy = bson::Document::new();
    for (k, v) in doc.iter() {
        copy.insert(k.clone(), deep_copy(v));
    }
    copy
}

/// Numeric magnitude as `f64`, used only for cross-representation compares
/// (Decimal128 <-> Double). Exact integer compares avoid this path.
fn numeric_as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

/// Exact integer magnitude, when both operands are representable without
/// going through floating point.
fn numeric_as_i128(value: &Bson) -> Option<i128> {
    match value {
        Bson::Int32(i) => Some(*i as i128),
        Bson::Int64(i) => Some(*i as i128),
        _ => None,
    }
}

/// Cross-representation numeric ordering. Returns `None` when either side
/// is NaN — callers map that to "no match" for relational operators and to
/// a stable (but otherwise unspecified) order for `$sort`.
pub fn compare_numeric(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(ai), Some(bi)) = (numeric_as_i128(a), numeric_as_i128(b)) {
        return Some(ai.cmp(&bi));
    }
    let af = numeric_as_f64(a)?;
    let bf = numeric_as_f64(b)?;
    af.partial_cmp(&bf)
}

/// Structural, deep equality with one relaxation: values in the numeric
/// family compare by magnitude across representations (`Int32(1) ==
/// Int64(1) == Double(1.0)`). NaN is never equal to anything, including
/// itself, per IEEE semantics.
pub fn value_equals(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_), _)
            if is_numeric(b) =>
        {
            compare_numeric(a, b) == Some(Ordering::Equal)
        }
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| value_equals(l, r))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((lk, lv), (rk, rv))| lk == rk && value_equals(lv, rv))
        }
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => {
            x.pattern == y.pattern && x.options == y.options
        }
        _ => a == b,
    }
}

/// Canonical MongoDB comparison order: by type family first, then by
/// natural order within a family. Used for `$gt`/`$lt`/`$sort`. Cross-type
/// comparisons (e.g. a number against a string) return the type-ordinal
/// ordering — never an error; callers implementing the matcher's "cross-type
/// mismatches are false, not an error" rule collapse that ordering as
/// appropriate for their operator instead of propagating a failure.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let (ta, tb) = (type_ordinal(a), type_ordinal(b));
    if ta != tb {
        return ta.cmp(&tb);
    }
    match (a, b) {
        (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_), _) => {
            compare_numeric(a, b).unwrap_or(Ordering::Equal)
        }
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let key_ord = lk.cmp(rk);
                if key_ord != Ordering::Equal {
                    return key_ord;
                }
                let ord = compare_values(lv, rv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}
