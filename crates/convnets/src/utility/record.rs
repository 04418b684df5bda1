//! # Record Summaries

use burn::prelude::Backend;
use burn::record::{HalfPrecisionSettings, Record};
use serde_json::{Map, Value};

/// Shape of a nested numeric JSON array; `None` if it is not one.
fn shape_of_numeric_array(arr: &[Value]) -> Option<Vec<usize>> {
    match arr.first() {
        None => Some(vec![0]),
        Some(first) if first.is_number() => Some(vec![arr.len()]),
        Some(Value::Array(inner)) => {
            let inner_shape = shape_of_numeric_array(inner)?;
            Some(std::iter::once(arr.len()).chain(inner_shape).collect())
        }
        Some(_) => None,
    }
}

/// Replace tensor payloads with ``{"_shape": [...]}``, keeping structure.
fn summarize_value(value: Value) -> Value {
    match value {
        Value::Array(a) => match shape_of_numeric_array(&a) {
            Some(shape) => {
                let mut obj = Map::new();
                obj.insert(
                    "_shape".to_string(),
                    Value::Array(shape.into_iter().map(Value::from).collect()),
                );
                Value::Object(obj)
            }
            None => Value::Array(a.into_iter().map(summarize_value).collect()),
        },
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .filter(|(k, v)| k != "bytes" && !v.is_null())
                .map(|(k, v)| {
                    let v = if k == "shape" { v } else { summarize_value(v) };
                    (k, v)
                })
                .collect(),
        ),
        v => v,
    }
}

/// Render a module record as pretty JSON, with tensor payloads elided.
///
/// Tensor data is dropped; each tensor keeps its ``shape``.
pub fn record_summary<B: Backend, R: Record<B>>(record: R) -> anyhow::Result<String> {
    let item = record.into_item::<HalfPrecisionSettings>();
    let value = summarize_value(serde_json::to_value(&item)?);
    Ok(serde_json::to_string_pretty(&value)?)
}
