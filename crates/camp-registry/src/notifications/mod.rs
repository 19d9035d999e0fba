//! Applicant e-mail: templates, the OAuth-backed mail identity, the Gmail
//! transport and the dispatcher that records what was sent.

pub mod credential;
pub mod dispatcher;
pub mod gmail;
pub mod templates;

pub use credential::{
    CredentialStore, GoogleOAuthClient, MailAuthStatus, MailCredential, MailCredentials,
    TokenExchange,
};
pub use dispatcher::{DispatchError, NotificationDispatcher, SendRequest};
pub use gmail::{GmailTransport, MailTransport};
pub use templates::{compose, event_label, OutgoingMessage};

/// Coarse failure class reported to the dashboard as `reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NotConnected,
    CredentialExpired,
    Transient,
    Rejected,
}

impl FailureReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureReason::NotConnected => "not_connected",
            FailureReason::CredentialExpired => "credential_expired",
            FailureReason::Transient => "transient",
            FailureReason::Rejected => "rejected",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Missing SMTP OAuth2 client credentials.")]
    NotConfigured,
    #[error("Gmail not connected. Please connect via Admin Dashboard.")]
    NotConnected,
    #[error("Gmail token expired. Please reconnect via Admin Dashboard. ({0})")]
    CredentialExpired(String),
    #[error("OAuth state did not match a pending authorization")]
    InvalidState,
    #[error("mail service unavailable: {0}")]
    Transient(String),
    #[error("mail service rejected the request: {0}")]
    Rejected(String),
    #[error("mail credential file error: {0}")]
    Storage(String),
}

impl MailError {
    pub fn reason(&self) -> FailureReason {
        match self {
            MailError::NotConfigured | MailError::NotConnected => FailureReason::NotConnected,
            MailError::CredentialExpired(_) => FailureReason::CredentialExpired,
            MailError::Transient(_) | MailError::Storage(_) => FailureReason::Transient,
            MailError::InvalidState | MailError::Rejected(_) => FailureReason::Rejected,
        }
    }
}
