use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    /// 12 random bytes rendered as 24 lowercase hex characters.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sport track an application belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Basketball,
    Football,
}

impl EventType {
    pub const ALL: [EventType; 2] = [EventType::Basketball, EventType::Football];

    /// Case-insensitive parse of the raw form or query value.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "basketball" => Some(Self::Basketball),
            "football" => Some(Self::Football),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::Basketball => "basketball",
            EventType::Football => "football",
        }
    }

    /// Form fields that must be present for this track.
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            EventType::Basketball => &[
                "parentFirstName",
                "parentLastName",
                "parentEmail",
                "parentPhone",
                "playerFullName",
                "playerAge",
                "playerGender",
                "playerPosition",
                "playerSchool",
                "playerLevel",
                "eligibilityAcknowledgement",
                "parentalConsent",
            ],
            EventType::Football => &[
                "playerFullName",
                "playerAge",
                "playerGender",
                "playerEmail",
                "playerPhone",
                "playerPosition",
                "playerCurrentTeam",
                "playerPreviousTeam",
                "playerInjury",
            ],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status of an application.
///
/// There is no transition graph: an admin may move an application from any
/// status to any other, including re-opening a paid application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Applied,
    Shortlisted,
    Selected,
    Paid,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 5] = [
        ApplicationStatus::Applied,
        ApplicationStatus::Shortlisted,
        ApplicationStatus::Selected,
        ApplicationStatus::Paid,
        ApplicationStatus::Rejected,
    ];

    /// Exact, lowercase match against the wire labels.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == raw)
    }

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Selected => "selected",
            ApplicationStatus::Paid => "paid",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Unconstrained transition: every status may follow every other.
    pub const fn transition(self, next: ApplicationStatus) -> ApplicationStatus {
        next
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The two applicant notifications the dashboard can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Acceptance,
    Rejection,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::Acceptance => "acceptance",
            NotificationKind::Rejection => "rejection",
        }
    }

    /// Payload key holding the sent flag.
    pub const fn flag_key(self) -> &'static str {
        match self {
            NotificationKind::Acceptance => "emailSentAcceptance",
            NotificationKind::Rejection => "emailSentRejection",
        }
    }

    /// Payload key holding the first-sent timestamp.
    pub const fn timestamp_key(self) -> &'static str {
        match self {
            NotificationKind::Acceptance => "emailSentAcceptanceAt",
            NotificationKind::Rejection => "emailSentRejectionAt",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Keys owned by the system; never accepted from a submission.
pub const RESERVED_KEYS: [&str; 9] = [
    "id",
    "createdAt",
    "status",
    "eventType",
    "videos",
    "emailSentAcceptance",
    "emailSentAcceptanceAt",
    "emailSentRejection",
    "emailSentRejectionAt",
];

/// Event-specific submission data stored alongside the fixed columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPayload {
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub email_sent_acceptance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_sent_acceptance_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub email_sent_rejection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_sent_rejection_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl ApplicationPayload {
    pub fn email_sent(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Acceptance => self.email_sent_acceptance,
            NotificationKind::Rejection => self.email_sent_rejection,
        }
    }

    pub fn email_sent_at(&self, kind: NotificationKind) -> Option<DateTime<Utc>> {
        match kind {
            NotificationKind::Acceptance => self.email_sent_acceptance_at,
            NotificationKind::Rejection => self.email_sent_rejection_at,
        }
    }

    /// Flip the flag for `kind` on. Flags only ever go false -> true and the
    /// first recorded timestamp is kept.
    pub fn mark_email_sent(&mut self, kind: NotificationKind, sent_at: DateTime<Utc>) {
        let (flag, at) = match kind {
            NotificationKind::Acceptance => (
                &mut self.email_sent_acceptance,
                &mut self.email_sent_acceptance_at,
            ),
            NotificationKind::Rejection => (
                &mut self.email_sent_rejection,
                &mut self.email_sent_rejection_at,
            ),
        };
        *flag = true;
        at.get_or_insert(sent_at);
    }

    /// Text value of a submitted field, if it holds one.
    pub fn field_text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Validated submission ready to be written by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub event_type: EventType,
    pub payload: ApplicationPayload,
}

/// A stored athlete application.
///
/// Serialises flat: `{id, createdAt, status, eventType, videos, emailSent*, ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: ApplicationId,
    pub created_at: DateTime<Utc>,
    pub status: ApplicationStatus,
    pub event_type: EventType,
    #[serde(flatten)]
    pub payload: ApplicationPayload,
}

impl Application {
    /// Assign identity, creation time and the initial `applied` status.
    pub fn create(new: NewApplication, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ApplicationId::generate(),
            created_at,
            status: ApplicationStatus::Applied,
            event_type: new.event_type,
            payload: new.payload,
        }
    }

    pub fn set_status(&mut self, next: ApplicationStatus) {
        self.status = self.status.transition(next);
    }
}

/// Per-status counts over a (possibly filtered) set of applications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: u64,
    pub applied: u64,
    pub shortlisted: u64,
    pub selected: u64,
    pub paid: u64,
    pub rejected: u64,
}

impl StatusSummary {
    pub fn record(&mut self, status: ApplicationStatus) {
        self.total += 1;
        let bucket = match status {
            ApplicationStatus::Applied => &mut self.applied,
            ApplicationStatus::Shortlisted => &mut self.shortlisted,
            ApplicationStatus::Selected => &mut self.selected,
            ApplicationStatus::Paid => &mut self.paid,
            ApplicationStatus::Rejected => &mut self.rejected,
        };
        *bucket += 1;
    }

    pub fn count(&self, status: ApplicationStatus) -> u64 {
        match status {
            ApplicationStatus::Applied => self.applied,
            ApplicationStatus::Shortlisted => self.shortlisted,
            ApplicationStatus::Selected => self.selected,
            ApplicationStatus::Paid => self.paid,
            ApplicationStatus::Rejected => self.rejected,
        }
    }
}

impl FromIterator<ApplicationStatus> for StatusSummary {
    fn from_iter<I: IntoIterator<Item = ApplicationStatus>>(iter: I) -> Self {
        let mut summary = StatusSummary::default();
        for status in iter {
            summary.record(status);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample(created_at: DateTime<Utc>) -> Application {
        let mut fields = BTreeMap::new();
        fields.insert("playerFullName".to_string(), json!("Ada Obi"));
        Application::create(
            NewApplication {
                event_type: EventType::Football,
                payload: ApplicationPayload {
                    videos: vec!["http://localhost/uploads/a.mp4".to_string()],
                    fields,
                    ..ApplicationPayload::default()
                },
            },
            created_at,
        )
    }

    #[test]
    fn event_type_parse_is_case_insensitive() {
        assert_eq!(EventType::parse(" BasketBall "), Some(EventType::Basketball));
        assert_eq!(EventType::parse("football"), Some(EventType::Football));
        assert_eq!(EventType::parse("tennis"), None);
    }

    #[test]
    fn status_parse_accepts_only_wire_labels() {
        for status in ApplicationStatus::ALL {
            assert_eq!(ApplicationStatus::parse(status.label()), Some(status));
        }
        assert_eq!(ApplicationStatus::parse("accepted"), None);
        assert_eq!(ApplicationStatus::parse("Paid"), None);
    }

    #[test]
    fn any_status_may_follow_any_other() {
        for from in ApplicationStatus::ALL {
            for to in ApplicationStatus::ALL {
                assert_eq!(from.transition(to), to);
            }
        }
    }

    #[test]
    fn generated_ids_are_hex_and_distinct() {
        let first = ApplicationId::generate();
        let second = ApplicationId::generate();
        assert_eq!(first.as_str().len(), 24);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn application_serialises_flat() {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let application = sample(created_at);
        let value = serde_json::to_value(&application).unwrap();

        assert_eq!(value["status"], json!("applied"));
        assert_eq!(value["eventType"], json!("football"));
        assert_eq!(value["playerFullName"], json!("Ada Obi"));
        assert_eq!(value["emailSentAcceptance"], json!(false));
        assert!(value.get("emailSentAcceptanceAt").is_none());
        assert_eq!(value["videos"].as_array().map(Vec::len), Some(1));

        let back: Application = serde_json::from_value(value).unwrap();
        assert_eq!(back, application);
    }

    #[test]
    fn mark_email_sent_keeps_first_timestamp_and_other_flag() {
        let first = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 3, 2, 9, 30, 0).unwrap();
        let mut payload = ApplicationPayload::default();

        payload.mark_email_sent(NotificationKind::Acceptance, first);
        payload.mark_email_sent(NotificationKind::Acceptance, later);

        assert!(payload.email_sent(NotificationKind::Acceptance));
        assert_eq!(payload.email_sent_at(NotificationKind::Acceptance), Some(first));
        assert!(!payload.email_sent(NotificationKind::Rejection));
        assert_eq!(payload.email_sent_at(NotificationKind::Rejection), None);
    }

    #[test]
    fn summary_tallies_each_bucket() {
        let summary: StatusSummary = [
            ApplicationStatus::Applied,
            ApplicationStatus::Applied,
            ApplicationStatus::Paid,
            ApplicationStatus::Rejected,
        ]
        .into_iter()
        .collect();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.paid, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.count(ApplicationStatus::Selected), 0);
    }
}
