use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::admin::{AdminSessions, InMemorySessionStore};
use crate::api::{registration_router, RegistrationState};
use crate::notifications::{
    CredentialStore, MailCredential, MailCredentials, MailError, MailTransport,
    NotificationDispatcher, OutgoingMessage,
};
use crate::registration::domain::{
    Application, ApplicationId, ApplicationStatus, EventType, NewApplication, NotificationKind,
    StatusSummary,
};
use crate::registration::intake::{RawSubmission, RegistrationIntake};
use crate::registration::review::ReviewService;
use crate::registration::store::{ApplicationStore, DocumentApplicationStore, StoreError};
use crate::registration::uploads::UploadStorage;

pub(super) const ADMIN_PASSWORD: &str = "letmein";
pub(super) const PUBLIC_BASE_URL: &str = "http://camp.test";
const BOUNDARY: &str = "camp-registry-test-boundary";

#[derive(Default)]
pub(super) struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    failure: Mutex<Option<fn() -> MailError>>,
}

impl RecordingTransport {
    pub(super) fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().expect("transport mutex poisoned").clone()
    }

    pub(super) fn fail_with(&self, failure: fn() -> MailError) {
        *self.failure.lock().expect("transport mutex poisoned") = Some(failure);
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, access_token: &str, message: &OutgoingMessage) -> Result<(), MailError> {
        assert_eq!(access_token, "test-access-token");
        if let Some(failure) = *self.failure.lock().expect("transport mutex poisoned") {
            return Err(failure());
        }
        self.sent
            .lock()
            .expect("transport mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}

/// Store that is reachable for reads but refuses every write.
pub(super) struct UnavailableStore;

fn offline() -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "database offline",
    ))
}

#[async_trait]
impl ApplicationStore for UnavailableStore {
    async fn init(&self) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn create_application(&self, _new: NewApplication) -> Result<Application, StoreError> {
        Err(offline())
    }

    async fn list_applications(
        &self,
        _filter: Option<EventType>,
    ) -> Result<Vec<Application>, StoreError> {
        Err(offline())
    }

    async fn summary(&self, _filter: Option<EventType>) -> Result<StatusSummary, StoreError> {
        Err(offline())
    }

    async fn fetch_application(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        Err(offline())
    }

    async fn update_application_status(
        &self,
        _id: &ApplicationId,
        _status: ApplicationStatus,
    ) -> Result<Option<Application>, StoreError> {
        Err(offline())
    }

    async fn update_application_email_status(
        &self,
        _id: &ApplicationId,
        _kind: NotificationKind,
        _sent_at: DateTime<Utc>,
    ) -> Result<Option<Application>, StoreError> {
        Err(offline())
    }

    async fn import_application(&self, _application: Application) -> Result<bool, StoreError> {
        Err(offline())
    }
}

pub(super) struct Harness {
    pub(super) state: RegistrationState,
    pub(super) store: Arc<DocumentApplicationStore>,
    pub(super) transport: Arc<RecordingTransport>,
    pub(super) credential_store: CredentialStore,
    pub(super) upload_dir: std::path::PathBuf,
    _workspace: TempDir,
}

impl Harness {
    pub(super) fn router(&self) -> axum::Router {
        registration_router(self.state.clone())
    }

    /// Published uploads; the staging directory is not included.
    pub(super) fn uploaded_files(&self) -> Vec<String> {
        files_in(&self.upload_dir)
    }

    pub(super) fn staged_files(&self) -> Vec<String> {
        files_in(&self.state.intake.uploads().staging_dir())
    }

    /// Submission whose videos are already staged, as the HTTP layer leaves them.
    pub(super) async fn submission(
        &self,
        fields: BTreeMap<String, Value>,
        videos: usize,
    ) -> RawSubmission {
        let uploads = self.state.intake.uploads();
        let mut staged = Vec::with_capacity(videos);
        for i in 0..videos {
            staged.push(
                uploads
                    .stage_bytes(&format!("clip {i}.mp4"), b"not really a video")
                    .await
                    .expect("video staged"),
            );
        }
        RawSubmission {
            fields,
            videos: staged,
        }
    }
}

fn files_in(dir: &std::path::Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub(super) async fn harness() -> Harness {
    let store = Arc::new(DocumentApplicationStore::in_memory());
    harness_with_store(store.clone(), store).await
}

pub(super) async fn harness_with_store(
    store: Arc<dyn ApplicationStore>,
    document_store: Arc<DocumentApplicationStore>,
) -> Harness {
    let workspace = tempfile::tempdir().expect("tempdir");
    let upload_dir = workspace.path().join("uploads");

    let credential_store = CredentialStore::new(workspace.path().join("secrets").join("token.json"));
    credential_store
        .save(&MailCredential {
            access_token: "test-access-token".to_string(),
            refresh_token: None,
            scope: None,
            token_type: Some("Bearer".to_string()),
            expiry_date: None,
        })
        .await
        .expect("credential saved");
    let credentials = Arc::new(MailCredentials::new(credential_store.clone(), None));
    let transport = Arc::new(RecordingTransport::default());

    let state = RegistrationState {
        intake: Arc::new(RegistrationIntake::new(
            store.clone(),
            UploadStorage::new(upload_dir.clone(), PUBLIC_BASE_URL),
        )),
        review: Arc::new(ReviewService::new(store.clone())),
        sessions: Arc::new(AdminSessions::new(
            ADMIN_PASSWORD,
            Arc::new(InMemorySessionStore::default()),
        )),
        dispatcher: Arc::new(NotificationDispatcher::new(
            store,
            credentials.clone(),
            transport.clone(),
        )),
        credentials,
        max_upload_bytes: 1024 * 1024,
    };

    Harness {
        state,
        store: document_store,
        transport,
        credential_store,
        upload_dir,
        _workspace: workspace,
    }
}

pub(super) fn basketball_fields() -> BTreeMap<String, Value> {
    [
        ("eventType", "basketball"),
        ("parentFirstName", "Ngozi"),
        ("parentLastName", "Eze"),
        ("parentEmail", "ngozi@example.org"),
        ("parentPhone", "+2348000000000"),
        ("playerFullName", "Chidi Eze"),
        ("playerAge", "15"),
        ("playerGender", "male"),
        ("playerPosition", "Point guard"),
        ("playerSchool", "Kings College"),
        ("playerLevel", "Intermediate"),
        ("eligibilityAcknowledgement", "yes"),
        ("parentalConsent", "yes"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), json!(value)))
    .collect()
}

pub(super) fn football_fields() -> BTreeMap<String, Value> {
    [
        ("eventType", "football"),
        ("playerFullName", "Ada Obi"),
        ("playerAge", "17"),
        ("playerGender", "female"),
        ("playerEmail", "ada@example.org"),
        ("playerPhone", "+2348111111111"),
        ("playerPosition", "Striker"),
        ("playerCurrentTeam", "Lagos Queens"),
        ("playerPreviousTeam", "Ikeja Academy"),
        ("playerInjury", "none"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), json!(value)))
    .collect()
}

/// `multipart/form-data` body with text fields followed by `playerVideo` files.
pub(super) fn multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    videos: &[(&str, &[u8])],
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (file_name, bytes) in videos {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"playerVideo\"; filename=\"{file_name}\"\r\nContent-Type: video/mp4\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart request")
}

pub(super) fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("encode body")))
        .expect("json request")
}

pub(super) fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("get request")
}

pub(super) async fn login(router: &axum::Router) -> String {
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/admin/login",
            None,
            json!({ "password": ADMIN_PASSWORD }),
        ))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    payload["token"]
        .as_str()
        .expect("token issued")
        .to_string()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
