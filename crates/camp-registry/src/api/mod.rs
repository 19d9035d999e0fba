//! HTTP surface for the public registration form and the admin dashboard.

pub mod auth;
pub mod error;
pub mod extract;
pub(crate) mod handlers;
pub mod router;

use std::sync::Arc;

use crate::admin::AdminSessions;
use crate::notifications::{MailCredentials, NotificationDispatcher};
use crate::registration::{RegistrationIntake, ReviewService};

pub use auth::AdminSession;
pub use error::{ApiError, ApiResult};
pub use extract::ApiJson;
pub use router::registration_router;

/// Shared collaborators handed to every handler.
#[derive(Clone)]
pub struct RegistrationState {
    pub intake: Arc<RegistrationIntake>,
    pub review: Arc<ReviewService>,
    pub sessions: Arc<AdminSessions>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub credentials: Arc<MailCredentials>,
    /// Request body limit for the intake route.
    pub max_upload_bytes: usize,
}
