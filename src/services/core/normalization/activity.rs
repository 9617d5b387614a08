// Funded activities ("finansierade aktiviteter")

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field_map::{EntityFieldMap, ACTIVITY_FIELDS};
use super::CanonicalRecord;
use crate::types::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Activity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl CanonicalRecord for Activity {
    const ENTITY: EntityKind = EntityKind::Activities;

    fn field_map() -> &'static EntityFieldMap {
        &ACTIVITY_FIELDS
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}

pub fn normalize_activity(raw: &Value) -> Option<Activity> {
    super::normalize(raw)
}

pub fn validate_activity(record: &Value) -> bool {
    super::validate::<Activity>(record)
}
