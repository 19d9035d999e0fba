//! Persistence for application records.
//!
//! Two providers implement [`ApplicationStore`]: a relational one on Postgres
//! and a document collection kept as a JSON file. The service picks one at
//! startup from `DB_PROVIDER`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, EventType, NewApplication, NotificationKind,
    StatusSummary,
};
use crate::config::StorageProvider;

pub mod document;
pub mod postgres;

pub use document::DocumentApplicationStore;
pub use postgres::PostgresApplicationStore;

/// Storage capability set shared by every provider.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Ensure the underlying schema or collection exists. Safe to call repeatedly.
    async fn init(&self) -> Result<(), StoreError>;

    /// Assign id, creation time and `applied` status, then persist.
    async fn create_application(&self, new: NewApplication) -> Result<Application, StoreError>;

    /// Newest first, optionally limited to one event type.
    async fn list_applications(
        &self,
        filter: Option<EventType>,
    ) -> Result<Vec<Application>, StoreError>;

    async fn summary(&self, filter: Option<EventType>) -> Result<StatusSummary, StoreError>;

    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, StoreError>;

    /// Unconditionally set the status; `None` when the id is unknown.
    async fn update_application_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<Option<Application>, StoreError>;

    /// Set the `emailSent{kind}` flag, merging into the payload; `None` when the id is unknown.
    async fn update_application_email_status(
        &self,
        id: &ApplicationId,
        kind: NotificationKind,
        sent_at: DateTime<Utc>,
    ) -> Result<Option<Application>, StoreError>;

    /// Insert a fully formed record unless its id already exists. Returns
    /// whether anything was written.
    async fn import_application(&self, application: Application) -> Result<bool, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database config missing: set DATABASE_URL or PGHOST/PGUSER/PGPASSWORD/PGDATABASE")]
    MissingConfiguration,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("document store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored record {id} is invalid: {reason}")]
    InvalidRecord { id: String, reason: String },
}

/// Build the provider named in configuration. Connection details are checked
/// here; the schema is created by [`ApplicationStore::init`].
pub fn from_config(provider: &StorageProvider) -> Result<Arc<dyn ApplicationStore>, StoreError> {
    match provider {
        StorageProvider::Postgres(config) => {
            Ok(Arc::new(PostgresApplicationStore::connect_lazy(config)?))
        }
        StorageProvider::Document { path } => {
            Ok(Arc::new(DocumentApplicationStore::open(path.clone())))
        }
    }
}
