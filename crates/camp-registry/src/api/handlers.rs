use axum::extract::multipart::Field;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::AdminSession;
use super::error::ApiResult;
use super::extract::ApiJson;
use super::RegistrationState;
use crate::notifications::SendRequest;
use crate::registration::intake::VIDEO_FIELD;
use crate::registration::{
    parse_event_filter, ApplicationId, NotificationKind, RawSubmission, StagingFile,
    UploadStorage,
};

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub event: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub(crate) async fn submit_application(
    State(state): State<RegistrationState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let submission = read_submission(state.intake.uploads(), multipart).await?;
    let application = state.intake.submit(submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "application": application })),
    )
        .into_response())
}

/// Text fields become JSON strings; a repeated field becomes an array.
/// Videos are streamed into staging files; a failed read removes them all.
async fn read_submission(
    uploads: &UploadStorage,
    mut multipart: Multipart,
) -> ApiResult<RawSubmission> {
    let mut submission = RawSubmission::default();
    if let Err(err) = collect_parts(uploads, &mut multipart, &mut submission).await {
        uploads.discard_staged(&submission.videos).await;
        return Err(err);
    }
    Ok(submission)
}

async fn collect_parts(
    uploads: &UploadStorage,
    multipart: &mut Multipart,
    submission: &mut RawSubmission,
) -> ApiResult<()> {
    while let Some(mut field) = multipart.next_field().await? {
        let Some(name) = field.name().map(|name| name.trim_end_matches("[]").to_string()) else {
            continue;
        };

        if name == VIDEO_FIELD {
            let original_name = field.file_name().unwrap_or_default().to_string();
            let mut staging = uploads.stage(&original_name).await?;
            if let Err(err) = stream_into(&mut field, &mut staging).await {
                staging.abandon().await;
                return Err(err);
            }
            let video = staging.finish().await?;
            // Browsers send an empty unnamed part for an untouched file input.
            if video.original_name.is_empty() && video.size == 0 {
                uploads.discard_staged(std::slice::from_ref(&video)).await;
                continue;
            }
            submission.videos.push(video);
            continue;
        }

        let text = field.text().await?;
        match submission.fields.remove(&name) {
            None => {
                submission.fields.insert(name, Value::String(text));
            }
            Some(Value::Array(mut items)) => {
                items.push(Value::String(text));
                submission.fields.insert(name, Value::Array(items));
            }
            Some(previous) => {
                submission
                    .fields
                    .insert(name, Value::Array(vec![previous, Value::String(text)]));
            }
        }
    }

    Ok(())
}

async fn stream_into(field: &mut Field<'_>, staging: &mut StagingFile) -> ApiResult<()> {
    while let Some(chunk) = field.chunk().await? {
        staging.write(&chunk).await?;
    }
    Ok(())
}

pub(crate) async fn login(
    State(state): State<RegistrationState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    // An unreadable body is a login without a password.
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "login body ignored");
            LoginRequest::default()
        }
    };
    let password = request.password.unwrap_or_default();
    let issued = state.sessions.login(&password).await?;
    Ok(Json(issued).into_response())
}

pub(crate) async fn logout(
    State(state): State<RegistrationState>,
    session: AdminSession,
) -> ApiResult<Response> {
    state.sessions.logout(&session.token).await?;
    Ok(Json(json!({ "ok": true })).into_response())
}

pub(crate) async fn summary(
    State(state): State<RegistrationState>,
    _session: AdminSession,
    Query(query): Query<EventQuery>,
) -> ApiResult<Response> {
    let filter = parse_event_filter(query.event.as_deref())?;
    let summary = state.review.summary(filter).await?;
    Ok(Json(json!({ "summary": summary })).into_response())
}

pub(crate) async fn list_applications(
    State(state): State<RegistrationState>,
    _session: AdminSession,
    Query(query): Query<EventQuery>,
) -> ApiResult<Response> {
    let filter = parse_event_filter(query.event.as_deref())?;
    let applications = state.review.list(filter).await?;
    Ok(Json(json!({ "applications": applications })).into_response())
}

pub(crate) async fn update_status(
    State(state): State<RegistrationState>,
    _session: AdminSession,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> ApiResult<Response> {
    let raw_status = update.status.unwrap_or_default();
    let application = state
        .review
        .update_status(&ApplicationId(id), &raw_status)
        .await?;
    Ok(Json(json!({ "application": application })).into_response())
}

pub(crate) async fn send_acceptance(
    State(state): State<RegistrationState>,
    _session: AdminSession,
    ApiJson(request): ApiJson<SendRequest>,
) -> ApiResult<Response> {
    send_notification(&state, NotificationKind::Acceptance, request).await
}

pub(crate) async fn send_rejection(
    State(state): State<RegistrationState>,
    _session: AdminSession,
    ApiJson(request): ApiJson<SendRequest>,
) -> ApiResult<Response> {
    send_notification(&state, NotificationKind::Rejection, request).await
}

async fn send_notification(
    state: &RegistrationState,
    kind: NotificationKind,
    request: SendRequest,
) -> ApiResult<Response> {
    state.dispatcher.send(kind, request).await?;
    Ok(Json(json!({ "ok": true })).into_response())
}

pub(crate) async fn google_consent(State(state): State<RegistrationState>) -> Response {
    match state.credentials.authorize_url().await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "cannot start mail consent");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

pub(crate) async fn google_callback(
    State(state): State<RegistrationState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let result = match (query.code.as_deref(), query.state.as_deref()) {
        (Some(code), Some(csrf_state)) => state
            .credentials
            .connect(code, csrf_state)
            .await
            .map_err(|err| err.to_string()),
        _ => Err(query
            .error
            .unwrap_or_else(|| "missing authorization code or state".to_string())),
    };

    match result {
        Ok(()) => Redirect::to("/admin/login").into_response(),
        Err(detail) => {
            tracing::error!(error = %detail, "mail consent callback failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to save Gmail tokens. {detail}"),
            )
                .into_response()
        }
    }
}

pub(crate) async fn auth_status(State(state): State<RegistrationState>) -> Response {
    Json(state.credentials.status().await).into_response()
}
