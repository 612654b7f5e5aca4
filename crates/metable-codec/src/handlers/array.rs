use metable_types::MetaValue;
use serde_json::Value as JsonValue;

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};

/// Handler for ordered and keyed containers of primitives, stored as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrayHandler;

impl TypeHandler for ArrayHandler {
    fn type_id(&self) -> &str {
        type_ids::ARRAY
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::List(_) | MetaValue::Map(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        match value {
            MetaValue::List(_) | MetaValue::Map(_) => serde_json::to_string(&value.to_json())
                .map_err(|e| CodecError::malformed(self.type_id(), e.to_string())),
            other => Err(CodecError::unsupported(self.type_id(), other)),
        }
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Ok(MetaValue::List(Vec::new()));
        };
        match serde_json::from_str::<JsonValue>(raw) {
            Ok(JsonValue::Array(items)) => Ok(MetaValue::List(items)),
            Ok(JsonValue::Object(map)) => Ok(MetaValue::Map(map)),
            Ok(other) => Err(CodecError::malformed(
                self.type_id(),
                format!("expected a JSON array or object, found {other}"),
            )),
            Err(e) => Err(CodecError::malformed(self.type_id(), e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_and_map_roundtrip() {
        let list = MetaValue::List(vec![json!(1), json!("two"), json!([3.5, null])]);
        let text = ArrayHandler.serialize(&list).unwrap();
        assert_eq!(text, r#"[1,"two",[3.5,null]]"#);
        assert_eq!(ArrayHandler.deserialize(Some(&text)).unwrap(), list);

        let map = match json!({"b": 1, "a": {"nested": true}}) {
            JsonValue::Object(m) => MetaValue::Map(m),
            _ => unreachable!(),
        };
        let text = ArrayHandler.serialize(&map).unwrap();
        assert_eq!(ArrayHandler.deserialize(Some(&text)).unwrap(), map);
    }

    #[test]
    fn keyed_order_is_preserved() {
        let map = match json!({"z": 1, "a": 2}) {
            JsonValue::Object(m) => MetaValue::Map(m),
            _ => unreachable!(),
        };
        assert_eq!(ArrayHandler.serialize(&map).unwrap(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn rejects_scalars() {
        assert!(!ArrayHandler.can_handle(&MetaValue::Str("[]".into())));
        assert!(ArrayHandler.serialize(&MetaValue::Int(1)).is_err());
        assert!(ArrayHandler.deserialize(Some("5")).is_err());
        assert!(ArrayHandler.deserialize(Some("{oops")).is_err());
    }

    #[test]
    fn empty_raw_is_empty_list() {
        assert_eq!(ArrayHandler.deserialize(None).unwrap(), MetaValue::List(vec![]));
    }
}
