use metable_types::MetaValue;

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};

/// Handler for the null value. Stored with a null raw value.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl TypeHandler for NullHandler {
    fn type_id(&self) -> &str {
        type_ids::NULL
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        value.is_null()
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        match value {
            MetaValue::Null => Ok(String::new()),
            other => Err(CodecError::unsupported(self.type_id(), other)),
        }
    }

    fn deserialize(&self, _raw: Option<&str>) -> CodecResult<MetaValue> {
        Ok(MetaValue::Null)
    }
}
