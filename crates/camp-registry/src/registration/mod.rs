//! Athlete application lifecycle: public intake, storage and admin review.

pub mod domain;
pub mod intake;
pub mod legacy;
pub mod review;
pub mod store;
pub mod uploads;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationId, ApplicationPayload, ApplicationStatus, EventType, NewApplication,
    NotificationKind, StatusSummary,
};
pub use intake::{IntakeError, RawSubmission, RegistrationIntake};
pub use legacy::{ImportReport, LegacyImportError};
pub use review::{parse_event_filter, ReviewError, ReviewService};
pub use store::{ApplicationStore, DocumentApplicationStore, PostgresApplicationStore, StoreError};
pub use uploads::{StagingFile, StoredUpload, UploadError, UploadStorage, UploadedFile};
