// Calls for proposals ("utlysningar")

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field_map::{EntityFieldMap, GRANT_FIELDS};
use super::CanonicalRecord;
use crate::types::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Grant {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl CanonicalRecord for Grant {
    const ENTITY: EntityKind = EntityKind::Grants;

    fn field_map() -> &'static EntityFieldMap {
        &GRANT_FIELDS
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}

pub fn normalize_grant(raw: &Value) -> Option<Grant> {
    super::normalize(raw)
}

pub fn validate_grant(record: &Value) -> bool {
    super::validate::<Grant>(record)
}
