use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;

use super::handlers::{
    auth_status, google_callback, google_consent, list_applications, login, logout,
    send_acceptance, send_rejection, submit_application, summary, update_status,
};
use super::RegistrationState;

/// Router builder exposing the public intake route and the admin API.
pub fn registration_router(state: RegistrationState) -> Router {
    let intake = Router::new()
        .route("/api/applications", post(submit_application))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    Router::new()
        .merge(intake)
        .route("/api/admin/login", post(login))
        .route("/api/admin/logout", post(logout))
        .route("/api/admin/summary", get(summary))
        .route("/api/admin/applications", get(list_applications))
        .route("/api/admin/applications/:id", patch(update_status))
        .route("/api/admin/send-acceptance", post(send_acceptance))
        .route("/api/admin/send-rejection", post(send_rejection))
        .route("/api/admin/auth/google", get(google_consent))
        .route("/api/admin/auth/callback", get(google_callback))
        .route("/api/admin/auth/status", get(auth_status))
        .with_state(state)
}
