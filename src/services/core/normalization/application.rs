// Applications ("ansokningar")

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field_map::{EntityFieldMap, APPLICATION_FIELDS};
use super::CanonicalRecord;
use crate::types::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Application {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub decision_date: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl CanonicalRecord for Application {
    const ENTITY: EntityKind = EntityKind::Applications;

    fn field_map() -> &'static EntityFieldMap {
        &APPLICATION_FIELDS
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}

pub fn normalize_application(raw: &Value) -> Option<Application> {
    super::normalize(raw)
}

pub fn validate_application(record: &Value) -> bool {
    super::validate::<Application>(record)
}
