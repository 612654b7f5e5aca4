//! Boolean, integer, float and string handlers.
//!
//! Each claims exactly its own variant, but serializes any scalar so that a
//! forced type can coerce (e.g. the string `"5"` stored as `integer`).
//! Non-scalar values are rejected outright rather than coerced.

use metable_types::MetaValue;

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};

fn scalar_text(handler: &str, value: &MetaValue) -> CodecResult<String> {
    match value {
        MetaValue::Null => Ok(String::new()),
        MetaValue::Bool(true) => Ok("1".into()),
        MetaValue::Bool(false) => Ok("0".into()),
        MetaValue::Int(n) => Ok(n.to_string()),
        MetaValue::Float(x) => Ok(x.to_string()),
        MetaValue::Str(s) => Ok(s.clone()),
        other => Err(CodecError::unsupported(handler, other)),
    }
}

fn coerce_bool(raw: &str) -> bool {
    !matches!(raw.trim().to_ascii_lowercase().as_str(), "" | "0" | "false")
}

fn coerce_int(raw: &str) -> i64 {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|x| x.is_finite())
                .map(|x| x.trunc() as i64)
        })
        .unwrap_or(0)
}

fn coerce_float(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}

/// Handler for `bool` values.
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanHandler;

impl TypeHandler for BooleanHandler {
    fn type_id(&self) -> &str {
        type_ids::BOOLEAN
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::Bool(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        match value {
            MetaValue::Str(s) => Ok(if coerce_bool(s) { "1" } else { "0" }.into()),
            MetaValue::Int(n) => Ok(if *n != 0 { "1" } else { "0" }.into()),
            other => scalar_text(self.type_id(), other),
        }
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        Ok(MetaValue::Bool(raw.map(coerce_bool).unwrap_or(false)))
    }
}

/// Handler for `i64` values.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerHandler;

impl TypeHandler for IntegerHandler {
    fn type_id(&self) -> &str {
        type_ids::INTEGER
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::Int(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        match value {
            MetaValue::Str(s) => Ok(coerce_int(s).to_string()),
            MetaValue::Float(x) if x.is_finite() => Ok((x.trunc() as i64).to_string()),
            other => scalar_text(self.type_id(), other),
        }
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        Ok(MetaValue::Int(raw.map(coerce_int).unwrap_or(0)))
    }

    fn numeric_value(&self, value: &MetaValue) -> Option<f64> {
        value.as_f64()
    }
}

/// Handler for `f64` values.
#[derive(Debug, Default, Clone, Copy)]
pub struct FloatHandler;

impl TypeHandler for FloatHandler {
    fn type_id(&self) -> &str {
        type_ids::FLOAT
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::Float(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        match value {
            MetaValue::Str(s) => Ok(coerce_float(s).to_string()),
            other => scalar_text(self.type_id(), other),
        }
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        Ok(MetaValue::Float(raw.map(coerce_float).unwrap_or(0.0)))
    }

    fn numeric_value(&self, value: &MetaValue) -> Option<f64> {
        value.as_f64()
    }
}

/// Handler for `String` values.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringHandler;

impl TypeHandler for StringHandler {
    fn type_id(&self) -> &str {
        type_ids::STRING
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::Str(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        scalar_text(self.type_id(), value)
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        Ok(MetaValue::Str(raw.unwrap_or_default().to_string()))
    }
}
