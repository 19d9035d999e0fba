use std::sync::Arc;

use super::domain::{Application, ApplicationId, ApplicationStatus, EventType, StatusSummary};
use super::store::{ApplicationStore, StoreError};

/// Admin-side reads and status changes over the application store.
pub struct ReviewService {
    store: Arc<dyn ApplicationStore>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Invalid status")]
    InvalidStatus,
    #[error("Invalid event type")]
    InvalidEventType,
    #[error("Application not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parse the `?event=` dashboard filter. Empty and `all` mean unfiltered.
pub fn parse_event_filter(raw: Option<&str>) -> Result<Option<EventType>, ReviewError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if raw.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    EventType::parse(raw)
        .map(Some)
        .ok_or(ReviewError::InvalidEventType)
}

impl ReviewService {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }

    pub async fn summary(&self, filter: Option<EventType>) -> Result<StatusSummary, ReviewError> {
        Ok(self.store.summary(filter).await?)
    }

    pub async fn list(&self, filter: Option<EventType>) -> Result<Vec<Application>, ReviewError> {
        Ok(self.store.list_applications(filter).await?)
    }

    /// Move an application to `raw_status`. Any status may follow any other.
    pub async fn update_status(
        &self,
        id: &ApplicationId,
        raw_status: &str,
    ) -> Result<Application, ReviewError> {
        let status = ApplicationStatus::parse(raw_status).ok_or(ReviewError::InvalidStatus)?;
        let application = self
            .store
            .update_application_status(id, status)
            .await?
            .ok_or(ReviewError::NotFound)?;
        tracing::info!(application_id = %id, status = %status, "application status updated");
        Ok(application)
    }
}
