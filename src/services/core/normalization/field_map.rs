//! Alias tables that map loosely-typed upstream payloads onto canonical fields.
//!
//! Each canonical field lists its source names in priority order: canonical
//! Swedish name, lower-case or alternate variant, then a generic English name.
//! Lookup tries every alias verbatim first and only then falls back to a
//! case-insensitive match, so schema drift in casing still resolves.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::types::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Passed through as a string
    Text,
    /// Reformatted to `YYYY-MM-DD` when a date is recognizable
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
}

#[derive(Debug)]
pub struct EntityFieldMap {
    pub entity: EntityKind,
    pub id_aliases: &'static [&'static str],
    pub fields: &'static [FieldRule],
}

const UPDATED_AT_ALIASES: &[&str] = &[
    "SenastAndrad",
    "senastAndrad",
    "Uppdaterad",
    "updated_at",
    "updatedAt",
    "lastModified",
];

pub static GRANT_FIELDS: EntityFieldMap = EntityFieldMap {
    entity: EntityKind::Grants,
    id_aliases: &["Diarienummer", "diarienummer", "id"],
    fields: &[
        FieldRule {
            field: "title",
            aliases: &["Titel", "titel", "title"],
            kind: FieldKind::Text,
        },
        FieldRule {
            field: "description",
            aliases: &["Beskrivning", "beskrivning", "description"],
            kind: FieldKind::Text,
        },
        FieldRule {
            field: "deadline",
            aliases: &[
                "Beslutsdatum",
                "beslutsdatum",
                "Publiceringsdatum",
                "publiceringsdatum",
                "deadline",
            ],
            kind: FieldKind::Date,
        },
        FieldRule {
            field: "sector",
            aliases: &["Sektor", "sektor", "sector"],
            kind: FieldKind::Text,
        },
        FieldRule {
            field: "stage",
            aliases: &["Stage", "stage"],
            kind: FieldKind::Text,
        },
        FieldRule {
            field: "updated_at",
            aliases: UPDATED_AT_ALIASES,
            kind: FieldKind::Text,
        },
    ],
};

pub static APPLICATION_FIELDS: EntityFieldMap = EntityFieldMap {
    entity: EntityKind::Applications,
    id_aliases: &["Diarienummer", "diarienummer", "id"],
    fields: &[
        FieldRule {
            field: "title",
            aliases: &["Titel", "titel", "title"],
            kind: FieldKind::Text,
        },
        FieldRule {
            field: "status",
            aliases: &["Status", "status"],
            kind: FieldKind::Text,
        },
        FieldRule {
            field: "decision_date",
            aliases: &["Beslutsdatum", "beslutsdatum", "decisionDate"],
            kind: FieldKind::Date,
        },
        FieldRule {
            field: "updated_at",
            aliases: UPDATED_AT_ALIASES,
            kind: FieldKind::Text,
        },
    ],
};

pub static ACTIVITY_FIELDS: EntityFieldMap = EntityFieldMap {
    entity: EntityKind::Activities,
    id_aliases: &["AktivitetsID", "aktivitetsid", "id"],
    fields: &[
        FieldRule {
            field: "name",
            aliases: &["Aktivitetsnamn", "aktivitetsnamn", "Namn", "namn", "name"],
            kind: FieldKind::Text,
        },
        FieldRule {
            field: "description",
            aliases: &["Beskrivning", "beskrivning", "description"],
            kind: FieldKind::Text,
        },
        FieldRule {
            field: "start_date",
            aliases: &["Startdatum", "startdatum", "startDate"],
            kind: FieldKind::Date,
        },
        FieldRule {
            field: "end_date",
            aliases: &["Slutdatum", "slutdatum", "endDate"],
            kind: FieldKind::Date,
        },
        FieldRule {
            field: "updated_at",
            aliases: UPDATED_AT_ALIASES,
            kind: FieldKind::Text,
        },
    ],
};

impl EntityFieldMap {
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once("id").chain(self.fields.iter().map(|rule| rule.field))
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// First present value among `aliases`: exact names first, then case-insensitive.
pub fn resolve<'a>(object: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|alias| object.get(*alias).filter(|value| is_present(value)))
        .or_else(|| {
            aliases.iter().find_map(|alias| {
                object
                    .iter()
                    .find(|(key, value)| key.eq_ignore_ascii_case(alias) && is_present(value))
                    .map(|(_, value)| value)
            })
        })
}

/// String form of a non-null value. Scalars use their display form, arrays and
/// objects their JSON text.
pub fn coerce_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").ok())
        .as_ref()
}

/// `YYYY-MM-DD` for the first real calendar date found in `raw`; otherwise
/// `raw` unchanged.
pub fn normalize_date(raw: &str) -> String {
    let Some(pattern) = date_pattern() else {
        return raw.to_string();
    };
    for captures in pattern.captures_iter(raw) {
        let parsed = (|| {
            let year = captures.get(1)?.as_str().parse::<i32>().ok()?;
            let month = captures.get(2)?.as_str().parse::<u32>().ok()?;
            let day = captures.get(3)?.as_str().parse::<u32>().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })();
        if let Some(date) = parsed {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

/// Why a raw record was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotAnObject,
    MissingId,
    InvalidId,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::NotAnObject => "input is not an object",
            Rejection::MissingId => "missing id",
            Rejection::InvalidId => "id is not a non-empty string",
        }
    }
}

/// Applies `map` to `raw`, producing an object with exactly the canonical keys.
pub fn apply(map: &EntityFieldMap, raw: &Value) -> Result<Map<String, Value>, Rejection> {
    let object = raw.as_object().ok_or(Rejection::NotAnObject)?;

    let id = match resolve(object, map.id_aliases) {
        None => return Err(Rejection::MissingId),
        Some(Value::String(id)) => id.clone(),
        Some(_) => return Err(Rejection::InvalidId),
    };

    let mut out = Map::new();
    out.insert("id".to_string(), Value::String(id));
    for rule in map.fields {
        let value = resolve(object, rule.aliases)
            .and_then(coerce_to_string)
            .map(|s| match rule.kind {
                FieldKind::Date => normalize_date(&s),
                FieldKind::Text => s,
            });
        out.insert(
            rule.field.to_string(),
            value.map(Value::String).unwrap_or(Value::Null),
        );
    }
    Ok(out)
}

/// Best-effort id for a rejected raw record, for error reporting.
pub fn recover_id(map: &EntityFieldMap, raw: &Value) -> Option<String> {
    raw.as_object()
        .and_then(|object| resolve(object, map.id_aliases))
        .and_then(coerce_to_string)
        .filter(|id| !id.is_empty())
}
