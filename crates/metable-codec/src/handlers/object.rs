use metable_types::{DynObject, MetaValue};
use serde_json::Value as JsonValue;

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};

/// Catch-all handler for object-like values, stored as JSON.
///
/// Claims anything object-like that no earlier handler took, so it must be
/// registered last. Reads come back as a generic [`DynObject`]: the
/// structure survives, the original class does not.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectHandler;

impl TypeHandler for ObjectHandler {
    fn type_id(&self) -> &str {
        type_ids::OBJECT
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        value.is_object_like()
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        if !value.is_object_like() {
            return Err(CodecError::unsupported(self.type_id(), value));
        }
        serde_json::to_string(&value.to_json())
            .map_err(|e| CodecError::malformed(self.type_id(), e.to_string()))
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        let Some(raw) = raw else {
            return Ok(MetaValue::Null);
        };
        match serde_json::from_str::<JsonValue>(raw) {
            Ok(JsonValue::Object(fields)) => Ok(MetaValue::Object(DynObject::generic(fields))),
            Ok(JsonValue::Null) => Ok(MetaValue::Null),
            Ok(other) => Err(CodecError::malformed(
                self.type_id(),
                format!("expected a JSON object, found {other}"),
            )),
            Err(e) => Err(CodecError::malformed(self.type_id(), e.to_string())),
        }
    }
}
