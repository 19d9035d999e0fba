use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::domain::{
    Application, ApplicationPayload, EventType, NewApplication, RESERVED_KEYS,
};
use super::store::{ApplicationStore, StoreError};
use super::uploads::{StoredUpload, UploadError, UploadStorage, UploadedFile};

/// Upper bound on `playerVideo` attachments per submission.
pub const MAX_VIDEOS: usize = 2;
/// Multipart field carrying the applicant's videos.
pub const VIDEO_FIELD: &str = "playerVideo";

/// Raw form submission as decoded by the HTTP layer.
///
/// Repeated form fields arrive as JSON arrays of strings. Videos are already
/// staged on disk; `submit` either publishes or removes them.
#[derive(Debug, Clone, Default)]
pub struct RawSubmission {
    pub fields: BTreeMap<String, Value>,
    pub videos: Vec<UploadedFile>,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Invalid event type")]
    InvalidEventType,
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("At most 2 videos may be attached")]
    TooManyVideos,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntakeError {
    /// Field names the client should highlight, if any.
    pub fn fields(&self) -> Option<Vec<String>> {
        match self {
            IntakeError::MissingFields(fields) => Some(fields.clone()),
            IntakeError::TooManyVideos => Some(vec![VIDEO_FIELD.to_string()]),
            IntakeError::InvalidEventType => Some(vec!["eventType".to_string()]),
            IntakeError::Upload(_) | IntakeError::Store(_) => None,
        }
    }
}

/// Validates public submissions and writes them through the store.
pub struct RegistrationIntake {
    store: Arc<dyn ApplicationStore>,
    uploads: UploadStorage,
}

impl RegistrationIntake {
    pub fn new(store: Arc<dyn ApplicationStore>, uploads: UploadStorage) -> Self {
        Self { store, uploads }
    }

    pub fn uploads(&self) -> &UploadStorage {
        &self.uploads
    }

    /// Check a submission without touching disk or the store.
    pub fn validate(&self, submission: &RawSubmission) -> Result<EventType, IntakeError> {
        let event_type = submission
            .fields
            .get("eventType")
            .and_then(Value::as_str)
            .and_then(EventType::parse)
            .ok_or(IntakeError::InvalidEventType)?;

        let mut missing: Vec<String> = event_type
            .required_fields()
            .iter()
            .filter(|field| is_missing(submission.fields.get(**field)))
            .map(|field| field.to_string())
            .collect();
        if submission.videos.is_empty() {
            missing.push(VIDEO_FIELD.to_string());
        }
        if !missing.is_empty() {
            return Err(IntakeError::MissingFields(missing));
        }

        if submission.videos.len() > MAX_VIDEOS {
            return Err(IntakeError::TooManyVideos);
        }

        Ok(event_type)
    }

    /// Validate, store the media, then write exactly one application.
    pub async fn submit(&self, submission: RawSubmission) -> Result<Application, IntakeError> {
        let event_type = match self.validate(&submission) {
            Ok(event_type) => event_type,
            Err(err) => {
                self.uploads.discard_staged(&submission.videos).await;
                return Err(err);
            }
        };
        let RawSubmission { fields, videos } = submission;

        let mut stored: Vec<StoredUpload> = Vec::with_capacity(videos.len());
        for (index, video) in videos.iter().enumerate() {
            match self.uploads.persist(video).await {
                Ok(upload) => stored.push(upload),
                Err(err) => {
                    self.uploads.discard(&stored).await;
                    self.uploads.discard_staged(&videos[index..]).await;
                    return Err(err.into());
                }
            }
        }

        let fields = fields
            .into_iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .collect();
        let payload = ApplicationPayload {
            videos: stored.iter().map(|upload| upload.url.clone()).collect(),
            fields,
            ..ApplicationPayload::default()
        };

        match self
            .store
            .create_application(NewApplication {
                event_type,
                payload,
            })
            .await
        {
            Ok(application) => {
                tracing::info!(
                    application_id = %application.id,
                    event_type = %application.event_type,
                    videos = application.payload.videos.len(),
                    "application received"
                );
                Ok(application)
            }
            Err(err) => {
                tracing::error!(error = %err, event_type = %event_type, "failed to store application");
                self.uploads.discard(&stored).await;
                Err(err.into())
            }
        }
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.iter().all(|item| is_missing(Some(item))),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_values_count_as_missing() {
        assert!(is_missing(None));
        assert!(is_missing(Some(&Value::Null)));
        assert!(is_missing(Some(&json!("   "))));
        assert!(is_missing(Some(&json!([]))));
        assert!(is_missing(Some(&json!(["", " "]))));
        assert!(!is_missing(Some(&json!("yes"))));
        assert!(!is_missing(Some(&json!(["", "guard"]))));
    }

    #[test]
    fn field_hints_name_the_offending_inputs() {
        assert_eq!(
            IntakeError::TooManyVideos.fields(),
            Some(vec!["playerVideo".to_string()])
        );
        assert_eq!(
            IntakeError::MissingFields(vec!["playerAge".to_string()]).to_string(),
            "Missing required fields: playerAge"
        );
    }
}
