// Common Test Data
// Upstream payload fixtures in the shapes the funding API actually returns

#![allow(dead_code)]

use serde_json::{json, Value};

pub const CALLS_PATH: &str = "/utlysningar";
pub const APPLICATIONS_PATH: &str = "/ansokningar";
pub const ACTIVITIES_PATH: &str = "/finansieradeaktiviteter";

/// Canonical Swedish field names, wrapped in `results`.
pub fn calls_page() -> Value {
    json!({
        "totalRecords": 2,
        "results": [
            {
                "Diarienummer": "2024-00101",
                "Titel": "Innovativa startups",
                "Beskrivning": "Stöd till tidiga bolag",
                "Publiceringsdatum": "2024-03-05T08:00:00",
                "Sektor": "Tech",
                "SenastAndrad": "2024-03-01T10:00:00Z"
            },
            {
                "diarienummer": "2024-00102",
                "titel": "Hållbar industri",
                "publiceringsdatum": "2024/4/1",
                "SenastAndrad": "2024-03-02T10:00:00Z"
            }
        ]
    })
}

/// One valid record, one without any id, one that is not an object.
pub fn mixed_applications_page() -> Value {
    json!([
        {"Diarienummer": "2023-555", "Titel": "Projekt X", "Status": "Beviljad", "Beslutsdatum": "2023-11-20"},
        {"Titel": "Utan id"},
        "garbage"
    ])
}

pub fn activities_page() -> Value {
    json!([
        {
            "AktivitetsID": "A-77",
            "Aktivitetsnamn": "Pilotstudie",
            "Startdatum": "2024-01-15",
            "Slutdatum": "2025-01-14",
            "updatedAt": "2024-02-01T00:00:00Z"
        }
    ])
}

/// Same grant as the first entry of `calls_page`, edited later.
pub fn updated_call() -> Value {
    json!([{
        "Diarienummer": "2024-00101",
        "Titel": "Innovativa startups 2.0",
        "SenastAndrad": "2024-04-01T10:00:00Z"
    }])
}

/// Same grant, but older than what `calls_page` stored.
pub fn outdated_call() -> Value {
    json!([{
        "Diarienummer": "2024-00101",
        "Titel": "Gammal titel",
        "SenastAndrad": "2023-01-01T00:00:00Z"
    }])
}
