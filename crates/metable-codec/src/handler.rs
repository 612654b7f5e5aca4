use metable_types::MetaValue;

use crate::error::CodecResult;

/// Stable type identifiers persisted in the `type` column.
pub mod type_ids {
    pub const BOOLEAN: &str = "boolean";
    pub const NULL: &str = "null";
    pub const INTEGER: &str = "integer";
    pub const FLOAT: &str = "float";
    pub const STRING: &str = "string";
    pub const DATE: &str = "date";
    pub const DATETIME: &str = "datetime";
    pub const ARRAY: &str = "array";
    pub const OBJECT: &str = "object";
    pub const ENUM: &str = "enum";
    pub const MODEL: &str = "model";
    pub const COLLECTION: &str = "collection";
    pub const SERIALIZABLE: &str = "serializable";
}

/// Codec and classifier for one kind of metadata value.
///
/// Round-trip law: for every `v` with `can_handle(v)`,
/// `deserialize(Some(&serialize(v)?))` is equivalent to `v`. The generic
/// object handler keeps structure but not class identity.
///
/// The trait is object-safe and `Send + Sync` so handlers can be shared in a
/// process-wide registry.
pub trait TypeHandler: Send + Sync {
    /// Identifier written to storage alongside the serialized value.
    fn type_id(&self) -> &str;

    /// Whether this handler claims `value` during classification.
    fn can_handle(&self, value: &MetaValue) -> bool;

    /// Convert a value to its stored text.
    fn serialize(&self, value: &MetaValue) -> CodecResult<String>;

    /// Convert stored text back into a value. `None` is a null column.
    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue>;

    /// Numeric projection used by numeric meta comparisons.
    fn numeric_value(&self, value: &MetaValue) -> Option<f64> {
        let _ = value;
        None
    }
}
