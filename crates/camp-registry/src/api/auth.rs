use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;
use super::RegistrationState;

/// Admin bearer session extracted from the `Authorization` header.
///
/// Adding it to a handler's arguments is what puts the route behind login.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub token: String,
}

#[axum::async_trait]
impl FromRequestParts<RegistrationState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &RegistrationState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = state.sessions.authorize(header).await?;
        Ok(AdminSession { token })
    }
}
