use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use reqwest::StatusCode;
use serde_json::json;

use super::templates::OutgoingMessage;
use super::MailError;

const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Outbound mail channel. Sends are synchronous within the calling request.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, access_token: &str, message: &OutgoingMessage) -> Result<(), MailError>;
}

/// Gmail REST `users.messages.send` with a base64url raw message.
pub struct GmailTransport {
    http: reqwest::Client,
    from: String,
    endpoint: String,
}

impl GmailTransport {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            from: from.into(),
            endpoint: GMAIL_SEND_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// RFC 822 message with an RFC 2047 encoded UTF-8 subject.
pub fn rfc822_message(from: &str, message: &OutgoingMessage) -> String {
    let subject = format!("=?utf-8?B?{}?=", STANDARD.encode(message.subject.as_bytes()));
    [
        format!("From: {from}"),
        format!("To: {}", message.recipient),
        "Content-Type: text/html; charset=utf-8".to_string(),
        "MIME-Version: 1.0".to_string(),
        format!("Subject: {subject}"),
        String::new(),
        message.html_body.clone(),
    ]
    .join("\r\n")
}

pub fn encode_raw(from: &str, message: &OutgoingMessage) -> String {
    URL_SAFE_NO_PAD.encode(rfc822_message(from, message).as_bytes())
}

fn classify_status(status: StatusCode, body: String) -> MailError {
    let detail = format!("{status}: {}", body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MailError::CredentialExpired(detail),
        StatusCode::TOO_MANY_REQUESTS => MailError::Transient(detail),
        status if status.is_server_error() => MailError::Transient(detail),
        _ => MailError::Rejected(detail),
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    async fn send(&self, access_token: &str, message: &OutgoingMessage) -> Result<(), MailError> {
        let raw = encode_raw(&self.from, message);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .json(&json!({ "raw": raw }))
            .send()
            .await
            .map_err(|err| MailError::Transient(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(recipient = %message.recipient, "gmail accepted message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }
}
