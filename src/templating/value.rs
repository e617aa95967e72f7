//! Runtime values produced while rendering.
//!
//! Data values remember whether they were derived from caller input
//! (`bound`). Bound values are never written into query text; the renderer
//! swaps them for positional tokens. Everything else is inlined literally.

use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use super::ast::CompareOp;
use super::handle::BuilderHandle;

#[derive(Clone, Debug)]
pub(crate) enum RuntimeValue {
    Data {
        value: Value,
        bound: bool,
    },
    Builder(Arc<BuilderHandle>),
}

impl RuntimeValue {
    pub(crate) const fn literal(value: Value) -> Self {
        Self::Data {
            value,
            bound: false,
        }
    }

    pub(crate) const fn bound(value: Value) -> Self {
        Self::Data {
            value,
            bound: true,
        }
    }

    pub(crate) const fn undefined() -> Self {
        Self::literal(Value::Null)
    }

    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Self::Data {
                value,
                ..
            } => truthy(value),
            Self::Builder(_) => true,
        }
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Member or index access on a data value. Missing entries yield `null`.
pub(crate) fn lookup(value: &Value, key: &Value) -> Value {
    let found = match (value, key) {
        (Value::Object(map), Value::String(field)) => map.get(field),
        (Value::Object(map), Value::Number(n)) => map.get(&n.to_string()),
        (Value::Array(items), Value::Number(n)) => {
            n.as_u64().and_then(|i| usize::try_from(i).ok()).and_then(|i| items.get(i))
        }
        (Value::Array(items), Value::String(s)) => {
            s.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    };
    found.cloned().unwrap_or(Value::Null)
}

pub(crate) fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    };
    match op {
        CompareOp::Eq => ordering.map_or_else(|| lhs == rhs, Ordering::is_eq),
        CompareOp::Ne => ordering.map_or_else(|| lhs != rhs, Ordering::is_ne),
        CompareOp::Lt => ordering.is_some_and(Ordering::is_lt),
        CompareOp::Gt => ordering.is_some_and(Ordering::is_gt),
        CompareOp::Le => ordering.is_some_and(Ordering::is_le),
        CompareOp::Ge => ordering.is_some_and(Ordering::is_ge),
    }
}

/// Text for a value inlined into the output.
pub(crate) fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
