use metable_types::{MetaValue, OpaqueBlob};

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};

/// Handler for explicitly serializable values ([`OpaqueBlob`]).
///
/// Only values packed with [`OpaqueBlob::pack`] are claimed; arbitrary
/// objects fall through to the object handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerializableHandler;

impl TypeHandler for SerializableHandler {
    fn type_id(&self) -> &str {
        type_ids::SERIALIZABLE
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::Blob(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        match value {
            MetaValue::Blob(blob) => Ok(blob.to_text()),
            other => Err(CodecError::unsupported(self.type_id(), other)),
        }
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        let Some(raw) = raw else {
            return Ok(MetaValue::Null);
        };
        OpaqueBlob::from_text(raw)
            .map(MetaValue::Blob)
            .map_err(|e| CodecError::malformed(self.type_id(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Window {
        width: u16,
        height: u16,
        title: String,
    }

    #[test]
    fn packed_values_roundtrip() {
        let window = Window {
            width: 800,
            height: 600,
            title: "main".into(),
        };
        let value = MetaValue::Blob(OpaqueBlob::pack("ui::Window", &window).unwrap());
        let text = SerializableHandler.serialize(&value).unwrap();
        let back = SerializableHandler.deserialize(Some(&text)).unwrap();
        assert_eq!(back, value);
        match back {
            MetaValue::Blob(blob) => assert_eq!(blob.unpack::<Window>().unwrap(), window),
            other => panic!("expected blob, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_text_is_malformed() {
        let err = SerializableHandler.deserialize(Some("ui::Window:not-hex")).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }
}
