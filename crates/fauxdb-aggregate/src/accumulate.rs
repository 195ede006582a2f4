use bson::Bson;
use fauxdb_bson::{compare_values, value_equals};
use fauxdb_expr::Expression;

use crate::error::{AggregateError, Result};

/// `$group` accumulators. `$sum`, `$first` and `$addToSet` are the base set;
/// `$avg`, `$min`, `$max`, `$last` and `$push` round out the common
/// accumulators a complete `$group` stage needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expression),
    Avg(Expression),
    First(Expression),
    Last(Expression),
    Min(Expression),
    Max(Expression),
    Push(Expression),
    AddToSet(Expression),
}

pub fn parse_accumulator(op: &str, expr: Expression) -> Result<Accumulator> {
    match op {
        "$sum" => Ok(Accumulator::Sum(expr)),
        "$avg" => Ok(Accumulator::Avg(expr)),
        "$first" => Ok(Accumulator::First(expr)),
        "$last" => Ok(Accumulator::Last(expr)),
        "$min" => Ok(Accumulator::Min(expr)),
        "$max" => Ok(Accumulator::Max(expr)),
        "$push" => Ok(Accumulator::Push(expr)),
        "$addToSet" => Ok(Accumulator::AddToSet(expr)),
        other => Err(AggregateError::Unsupported(format!("group accumulator: {other}"))),
    }
}

pub fn expression_of(acc: &Accumulator) -> &Expression {
    match acc {
        Accumulator::Sum(e)
        | Accumulator::Avg(e)
        | Accumulator::First(e)
        | Accumulator::Last(e)
        | Accumulator::Min(e)
        | Accumulator::Max(e)
        | Accumulator::Push(e)
        | Accumulator::AddToSet(e) => e,
    }
}

#[derive(Debug, Clone)]
pub enum AccState {
    Sum(Bson),
    Avg { sum: f64, count: i64 },
    First(Option<Bson>),
    Last(Option<Bson>),
    Min(Option<Bson>),
    Max(Option<Bson>),
    Push(Vec<Bson>),
    AddToSet(Vec<Bson>),
}

pub fn init_state(acc: &Accumulator) -> AccState {
    match acc {
        Accumulator::Sum(_) => AccState::Sum(Bson::Int64(0)),
        Accumulator::Avg(_) => AccState::Avg { sum: 0.0, count: 0 },
        Accumulator::First(_) => AccState::First(None),
        Accumulator::Last(_) => AccState::Last(None),
        Accumulator::Min(_) => AccState::Min(None),
        Accumulator::Max(_) => AccState::Max(None),
        Accumulator::Push(_) => AccState::Push(Vec::new()),
        Accumulator::AddToSet(_) => AccState::AddToSet(Vec::new()),
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

pub fn fold(state: &mut AccState, value: Option<Bson>) {
    match state {
        AccState::Sum(total) => {
            if let Some(v) = value.as_ref().and_then(as_f64) {
                let is_double = matches!(value, Some(Bson::Double(_))) || matches!(total, Bson::Double(_));
                let sum = as_f64(total).unwrap_or(0.0) + v;
                *total = if is_double { Bson::Double(sum) } else { Bson::Int64(sum as i64) };
            }
        }
        AccState::Avg { sum, count } => {
            if let Some(v) = value.as_ref().and_then(as_f64) {
                *sum += v;
                *count += 1;
            }
        }
        AccState::First(slot) => {
            if slot.is_none() {
                *slot = Some(value.unwrap_or(Bson::Null));
            }
        }
        AccState::Last(slot) => {
            *slot = Some(value.unwrap_or(Bson::Null));
        }
        AccState::Min(slot) => {
            if let Some(v) = value {
                match slot {
                    Some(current) if compare_values(&v, current) != std::cmp::Ordering::Less => {}
                    _ => *slot = Some(v),
                }
            }
        }
        AccState::Max(slot) => {
            if let Some(v) = value {
                match slot {
                    Some(current) if compare_values(&v, current) != std::cmp::Ordering::Greater => {}
                    _ => *slot = Some(v),
                }
            }
        }
        AccState::Push(items) => items.push(value.unwrap_or(Bson::Null)),
        AccState::AddToSet(items) => {
            if let Some(v) = value {
                if !items.iter().any(|existing| value_equals(existing, &v)) {
                    items.push(v);
                }
            }
        }
    }
}

pub fn finalize(state: AccState) -> Bson {
    match state {
        AccState::Sum(total) => total,
        AccState::Avg { sum, count } => {
            if count > 0 {
                Bson::Double(sum / count as f64)
            } else {
                Bson::Null
            }
        }
        AccState::First(slot) | AccState::Last(slot) | AccState::Min(slot) | AccState::Max(slot) => {
            slot.unwrap_or(Bson::Null)
        }
        AccState::Push(items) | AccState::AddToSet(items) => Bson::Array(items),
    }
}
