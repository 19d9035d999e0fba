use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::credential::MailCredentials;
use super::gmail::MailTransport;
use super::templates::compose;
use super::MailError;
use crate::registration::{ApplicationId, ApplicationStore, NotificationKind, StoreError};

/// Body of `send-acceptance` / `send-rejection`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub application_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Email required.")]
    MissingRecipient,
    #[error("Invalid email.")]
    InvalidRecipient,
    #[error("Application not found")]
    NotFound,
    #[error("Email already sent")]
    AlreadySent {
        kind: NotificationKind,
        sent_at: Option<DateTime<Utc>>,
    },
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type SendKey = (ApplicationId, NotificationKind);

/// Sends applicant notifications and records them on the application.
///
/// Sends for the same application and kind are serialised through an
/// in-process claim, so a second click while the first is in flight is
/// refused. Separate processes sharing one store are not coordinated.
pub struct NotificationDispatcher {
    store: Arc<dyn ApplicationStore>,
    credentials: Arc<MailCredentials>,
    transport: Arc<dyn MailTransport>,
    in_flight: Mutex<HashSet<SendKey>>,
}

/// Held for the whole send; releases the claim on drop.
struct SendClaim<'a> {
    in_flight: &'a Mutex<HashSet<SendKey>>,
    key: SendKey,
}

impl Drop for SendClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        credentials: Arc<MailCredentials>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            store,
            credentials,
            transport,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn credentials(&self) -> &Arc<MailCredentials> {
        &self.credentials
    }

    pub async fn send(
        &self,
        kind: NotificationKind,
        request: SendRequest,
    ) -> Result<(), DispatchError> {
        let email = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or(DispatchError::MissingRecipient)?;
        // The address becomes a raw `To:` header line.
        if email.chars().any(char::is_control) {
            tracing::warn!(kind = %kind, "notification recipient rejected");
            return Err(DispatchError::InvalidRecipient);
        }

        let application_id = request
            .application_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| ApplicationId(id.to_string()));

        let _claim = application_id
            .as_ref()
            .map(|id| self.claim(id, kind))
            .transpose()?;

        let mut event_type = request.event_type.clone();
        if let Some(id) = &application_id {
            let application = self
                .store
                .fetch_application(id)
                .await?
                .ok_or(DispatchError::NotFound)?;
            if application.payload.email_sent(kind) {
                tracing::info!(application_id = %id, kind = %kind, "notification already sent");
                return Err(DispatchError::AlreadySent {
                    kind,
                    sent_at: application.payload.email_sent_at(kind),
                });
            }
            if event_type.is_none() {
                event_type = Some(application.event_type.as_str().to_string());
            }
        }

        let access_token = self.credentials.access_token().await?;
        let message = compose(kind, email, request.name.as_deref(), event_type.as_deref());
        if let Err(err) = self.transport.send(&access_token, &message).await {
            tracing::error!(
                kind = %kind,
                reason = err.reason().as_str(),
                error = %err,
                "notification send failed"
            );
            return Err(err.into());
        }
        tracing::info!(kind = %kind, "notification sent");

        if let Some(id) = application_id {
            match self
                .store
                .update_application_email_status(&id, kind, Utc::now())
                .await
            {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(application_id = %id, kind = %kind, "application vanished before email bookkeeping");
                }
                Err(err) => {
                    tracing::error!(application_id = %id, kind = %kind, error = %err, "failed to record sent email");
                }
            }
        }

        Ok(())
    }

    fn claim(
        &self,
        id: &ApplicationId,
        kind: NotificationKind,
    ) -> Result<SendClaim<'_>, DispatchError> {
        let key = (id.clone(), kind);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            tracing::info!(application_id = %id, kind = %kind, "notification already in flight");
            return Err(DispatchError::AlreadySent {
                kind,
                sent_at: None,
            });
        }
        Ok(SendClaim {
            in_flight: &self.in_flight,
            key,
        })
    }
}
