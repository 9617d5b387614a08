//! Normalization and validation of upstream payloads.
//!
//! Upstream records arrive with Swedish, lower-cased or English field names and
//! loosely typed values. [`normalize`] maps them onto one of the canonical record
//! types through the alias tables in [`field_map`], and [`validate`] performs the
//! strict shape check a record must pass before it is written.

pub mod activity;
pub mod application;
pub mod field_map;
pub mod grant;

pub use activity::{normalize_activity, validate_activity, Activity};
pub use application::{normalize_application, validate_application, Application};
pub use field_map::{EntityFieldMap, FieldKind, FieldRule, Rejection};
pub use grant::{normalize_grant, validate_grant, Grant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::types::EntityKind;

/// Shared surface of the canonical record types.
pub trait CanonicalRecord: Serialize + DeserializeOwned + Clone + std::fmt::Debug {
    const ENTITY: EntityKind;

    fn field_map() -> &'static EntityFieldMap;

    fn id(&self) -> &str;

    fn updated_at(&self) -> Option<&str>;

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Maps a raw upstream payload onto `T`. Returns `None`, with a warning, when
/// the payload is not an object or has no usable id.
pub fn normalize<T: CanonicalRecord>(raw: &Value) -> Option<T> {
    let map = T::field_map();
    let object = match field_map::apply(map, raw) {
        Ok(object) => object,
        Err(rejection) => {
            crate::log_warn!(
                "Normalization rejected record",
                serde_json::json!({
                    "entity": T::ENTITY.as_str(),
                    "reason": rejection.as_str(),
                })
            );
            return None;
        }
    };

    match serde_json::from_value::<T>(Value::Object(object)) {
        Ok(record) => Some(record),
        Err(e) => {
            crate::log_warn!(
                "Normalized record does not fit canonical shape",
                serde_json::json!({
                    "entity": T::ENTITY.as_str(),
                    "error": e.to_string(),
                })
            );
            None
        }
    }
}

/// Strictly parses `record` as `T`: a non-empty string id, known fields as
/// string or null, and no other keys.
pub fn parse_strict<T: CanonicalRecord>(record: &Value) -> Result<T, String> {
    let parsed = T::deserialize(record).map_err(|e| e.to_string())?;
    if parsed.id().is_empty() {
        return Err("id must be a non-empty string".to_string());
    }
    Ok(parsed)
}

/// `true` when `record` passes [`parse_strict`]; logs a warning with the error
/// and the offending record otherwise.
pub fn validate<T: CanonicalRecord>(record: &Value) -> bool {
    match parse_strict::<T>(record) {
        Ok(_) => true,
        Err(error) => {
            crate::log_warn!(
                "Validation failed",
                serde_json::json!({
                    "entity": T::ENTITY.as_str(),
                    "errors": [error],
                    "record": record,
                })
            );
            false
        }
    }
}
