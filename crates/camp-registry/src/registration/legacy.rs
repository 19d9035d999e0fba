//! One-shot import of the pre-database `applications.json` collection.
//!
//! Records are inserted only when their id is not already stored, so the
//! import can be re-run against the same file.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::domain::{
    Application, ApplicationId, ApplicationPayload, ApplicationStatus, EventType,
};
use super::store::{ApplicationStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LegacyImportError {
    #[error("failed to read legacy file: {0}")]
    Read(#[from] std::io::Error),
    #[error("legacy file is not a JSON array of applications: {0}")]
    Format(String),
    #[error("legacy record {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome counters reported by the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub read: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Read `path` and insert every record the store does not already hold.
pub async fn import_file(
    store: &dyn ApplicationStore,
    path: &Path,
) -> Result<ImportReport, LegacyImportError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let records = parse_collection(&raw)?;
    let now = Utc::now();

    let mut report = ImportReport {
        read: records.len(),
        ..ImportReport::default()
    };
    for (index, record) in records.into_iter().enumerate() {
        let application = legacy_application(index, record, now)?;
        let id = application.id.clone();
        if store.import_application(application).await? {
            report.inserted += 1;
        } else {
            tracing::debug!(application_id = %id, "legacy record already present");
            report.skipped += 1;
        }
    }

    tracing::info!(
        read = report.read,
        inserted = report.inserted,
        skipped = report.skipped,
        "legacy import finished"
    );
    Ok(report)
}

/// A blank file is an empty collection.
pub fn parse_collection(raw: &str) -> Result<Vec<Value>, LegacyImportError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(_) => Err(LegacyImportError::Format("top-level value is not an array".to_string())),
        Err(err) => Err(LegacyImportError::Format(err.to_string())),
    }
}

/// Fill missing system fields (random id, `now`, `applied`, `basketball`)
/// and split the rest into the payload.
pub fn legacy_application(
    index: usize,
    record: Value,
    now: DateTime<Utc>,
) -> Result<Application, LegacyImportError> {
    let invalid = |reason: String| LegacyImportError::InvalidRecord { index, reason };

    let Value::Object(mut fields) = record else {
        return Err(invalid("record is not an object".to_string()));
    };

    let id = take_text(&mut fields, "id")
        .map(ApplicationId)
        .unwrap_or_else(ApplicationId::generate);
    let created_at = match take_text(&mut fields, "createdAt") {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|err| invalid(format!("createdAt '{raw}': {err}")))?,
        None => now,
    };
    let status = match take_text(&mut fields, "status") {
        Some(raw) => ApplicationStatus::parse(&raw)
            .ok_or_else(|| invalid(format!("unknown status '{raw}'")))?,
        None => ApplicationStatus::Applied,
    };
    let event_type = match take_text(&mut fields, "eventType") {
        Some(raw) => {
            EventType::parse(&raw).ok_or_else(|| invalid(format!("unknown event type '{raw}'")))?
        }
        None => EventType::Basketball,
    };

    let payload: ApplicationPayload = serde_json::from_value(Value::Object(fields))
        .map_err(|err| invalid(err.to_string()))?;

    Ok(Application {
        id,
        created_at,
        status,
        event_type,
        payload,
    })
}

fn take_text(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::store::DocumentApplicationStore;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn defaults_fill_missing_system_fields() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();
        let application =
            legacy_application(0, json!({"playerFullName": "Tomi Ade"}), now).unwrap();

        assert_eq!(application.id.as_str().len(), 24);
        assert_eq!(application.created_at, now);
        assert_eq!(application.status, ApplicationStatus::Applied);
        assert_eq!(application.event_type, EventType::Basketball);
        assert_eq!(application.payload.field_text("playerFullName"), Some("Tomi Ade"));
    }

    #[test]
    fn explicit_fields_are_kept() {
        let application = legacy_application(
            3,
            json!({
                "id": "legacy-7",
                "createdAt": "2024-11-02T08:15:00.000Z",
                "status": "paid",
                "eventType": "football",
                "videos": ["http://localhost:4000/uploads/a.mp4"],
                "emailSentAcceptance": true
            }),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(application.id.as_str(), "legacy-7");
        assert_eq!(application.status, ApplicationStatus::Paid);
        assert_eq!(application.event_type, EventType::Football);
        assert_eq!(application.payload.videos.len(), 1);
        assert!(application.payload.email_sent_acceptance);
        assert!(application.payload.fields.is_empty());
    }

    #[test]
    fn unknown_status_names_the_record() {
        match legacy_application(4, json!({"status": "waitlisted"}), Utc::now()) {
            Err(LegacyImportError::InvalidRecord { index, reason }) => {
                assert_eq!(index, 4);
                assert!(reason.contains("waitlisted"));
            }
            other => panic!("expected invalid record, got {other:?}"),
        }
    }

    #[test]
    fn blank_collection_is_empty() {
        assert!(parse_collection("  \n").unwrap().is_empty());
        assert!(matches!(
            parse_collection("{\"id\": 1}"),
            Err(LegacyImportError::Format(_))
        ));
    }

    #[tokio::test]
    async fn reimport_skips_existing_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("applications.json");
        std::fs::write(
            &path,
            r#"[{"id": "a1", "eventType": "football"}, {"id": "a2"}]"#,
        )
        .expect("write legacy file");

        let store = DocumentApplicationStore::in_memory();
        let first = import_file(&store, &path).await.expect("first import");
        assert_eq!(
            first,
            ImportReport {
                read: 2,
                inserted: 2,
                skipped: 0
            }
        );

        let second = import_file(&store, &path).await.expect("second import");
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 2);
    }
}
