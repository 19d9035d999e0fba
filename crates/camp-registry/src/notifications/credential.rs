use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    RequestTokenError, Scope, StandardErrorResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::MailError;
use crate::config::MailConfig;

pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Tokens are treated as expired slightly early so a send never races the deadline.
const EXPIRY_SKEW_SECONDS: i64 = 60;
const PENDING_STATE_TTL_MINUTES: i64 = 15;

/// Mail identity persisted in the credential file.
///
/// The layout (`access_token`, `refresh_token`, `expiry_date` in epoch millis)
/// matches the token files written by Google's client libraries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailCredential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl MailCredential {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry_date.and_then(DateTime::from_timestamp_millis)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now + Duration::seconds(EXPIRY_SKEW_SECONDS) >= expires_at,
            None => false,
        }
    }

    /// Overlay a refreshed credential, keeping the refresh token when the
    /// provider did not issue a new one.
    fn merged_with(self, refreshed: MailCredential) -> MailCredential {
        MailCredential {
            refresh_token: refreshed.refresh_token.or(self.refresh_token),
            scope: refreshed.scope.or(self.scope),
            token_type: refreshed.token_type.or(self.token_type),
            ..refreshed
        }
    }
}

/// Observable connection state shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MailAuthStatus {
    pub connected: bool,
    pub expired: bool,
}

/// JSON secret file holding the current [`MailCredential`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the file is missing or unreadable.
    pub async fn load(&self) -> Option<MailCredential> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read mail credential");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(credential) => Some(credential),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "mail credential file is invalid");
                None
            }
        }
    }

    pub async fn save(&self, credential: &MailCredential) -> Result<(), MailError> {
        let encoded = serde_json::to_vec(credential)
            .map_err(|err| MailError::Storage(err.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| MailError::Storage(err.to_string()))?;
        }
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|err| MailError::Storage(err.to_string()))
    }
}

/// OAuth authorization-code client for the mail identity.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Consent URL plus the CSRF state the callback must echo.
    fn authorize_url(&self) -> (String, String);
    async fn exchange_code(&self, code: &str) -> Result<MailCredential, MailError>;
    async fn refresh(&self, refresh_token: &str) -> Result<MailCredential, MailError>;
}

/// Google's OAuth endpoints driven through the `oauth2` crate.
pub struct GoogleOAuthClient {
    client: BasicClient,
}

impl GoogleOAuthClient {
    /// `None` when the client id or secret is not configured.
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>, MailError> {
        let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret)
        else {
            return Ok(None);
        };

        let invalid = |err: oauth2::url::ParseError| MailError::Rejected(err.to_string());
        let client = BasicClient::new(
            ClientId::new(client_id.clone()),
            Some(ClientSecret::new(client_secret.clone())),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string()).map_err(invalid)?,
            Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string()).map_err(invalid)?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_uri.clone()).map_err(invalid)?);

        Ok(Some(Self { client }))
    }
}

fn credential_from_response(response: &BasicTokenResponse) -> MailCredential {
    let expiry_date = response.expires_in().and_then(|lifetime| {
        Duration::from_std(lifetime)
            .ok()
            .map(|lifetime| (Utc::now() + lifetime).timestamp_millis())
    });
    let scope = response.scopes().map(|scopes| {
        scopes
            .iter()
            .map(|scope| scope.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    });

    MailCredential {
        access_token: response.access_token().secret().clone(),
        refresh_token: response
            .refresh_token()
            .map(|token| token.secret().clone()),
        scope,
        token_type: Some("Bearer".to_string()),
        expiry_date,
    }
}

type TokenRequestError<RE> =
    RequestTokenError<RE, StandardErrorResponse<BasicErrorResponseType>>;

/// `invalid_grant` and friends mean the user has to reconnect; transport
/// failures are worth retrying later.
fn classify_token_error<RE: std::error::Error + 'static>(err: TokenRequestError<RE>) -> MailError {
    match err {
        RequestTokenError::ServerResponse(response) => {
            let detail = match response.error_description() {
                Some(description) => format!("{}: {description}", response.error()),
                None => response.error().to_string(),
            };
            MailError::CredentialExpired(detail)
        }
        RequestTokenError::Request(err) => MailError::Transient(err.to_string()),
        RequestTokenError::Parse(err, _) => MailError::Transient(err.to_string()),
        RequestTokenError::Other(detail) => MailError::Transient(detail),
    }
}

#[async_trait]
impl TokenExchange for GoogleOAuthClient {
    fn authorize_url(&self) -> (String, String) {
        let (url, state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(GMAIL_SEND_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();
        (url.to_string(), state.secret().clone())
    }

    async fn exchange_code(&self, code: &str) -> Result<MailCredential, MailError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(classify_token_error)?;
        Ok(credential_from_response(&response))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<MailCredential, MailError> {
        let token = RefreshToken::new(refresh_token.to_string());
        let response = self
            .client
            .exchange_refresh_token(&token)
            .request_async(async_http_client)
            .await
            .map_err(classify_token_error)?;
        Ok(credential_from_response(&response))
    }
}

/// Owns the mail credential lifecycle: consent, code exchange, refresh and status.
pub struct MailCredentials {
    store: CredentialStore,
    exchange: Option<Arc<dyn TokenExchange>>,
    pending_states: Mutex<HashMap<String, DateTime<Utc>>>,
    refresh_lock: Mutex<()>,
}

impl MailCredentials {
    pub fn new(store: CredentialStore, exchange: Option<Arc<dyn TokenExchange>>) -> Self {
        Self {
            store,
            exchange,
            pending_states: Mutex::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    fn exchange(&self) -> Result<&Arc<dyn TokenExchange>, MailError> {
        self.exchange.as_ref().ok_or(MailError::NotConfigured)
    }

    /// Consent URL for the admin to visit; remembers the issued state.
    pub async fn authorize_url(&self) -> Result<String, MailError> {
        let (url, state) = self.exchange()?.authorize_url();
        let now = Utc::now();
        let mut pending = self.pending_states.lock().await;
        pending.retain(|_, issued_at| now - *issued_at < Duration::minutes(PENDING_STATE_TTL_MINUTES));
        pending.insert(state, now);
        Ok(url)
    }

    /// Complete the consent flow and persist the resulting credential.
    pub async fn connect(&self, code: &str, state: &str) -> Result<(), MailError> {
        let issued_at = self.pending_states.lock().await.remove(state);
        match issued_at {
            Some(issued_at)
                if Utc::now() - issued_at < Duration::minutes(PENDING_STATE_TTL_MINUTES) => {}
            _ => return Err(MailError::InvalidState),
        }

        let exchange = self.exchange()?;
        let _guard = self.refresh_lock.lock().await;
        let issued = exchange.exchange_code(code).await?;
        let credential = match self.store.load().await {
            Some(previous) => previous.merged_with(issued),
            None => issued,
        };
        self.store.save(&credential).await?;
        tracing::info!("mail credential connected");
        Ok(())
    }

    /// A usable access token, refreshing and persisting when the stored one expired.
    pub async fn access_token(&self) -> Result<String, MailError> {
        let _guard = self.refresh_lock.lock().await;
        let credential = self.store.load().await.ok_or(MailError::NotConnected)?;
        if !credential.is_expired(Utc::now()) {
            return Ok(credential.access_token);
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(MailError::CredentialExpired(
                "no refresh token stored".to_string(),
            ));
        };
        let exchange = self.exchange.as_ref().ok_or_else(|| {
            MailError::CredentialExpired("oauth client not configured".to_string())
        })?;

        let refreshed = exchange.refresh(&refresh_token).await?;
        let merged = credential.merged_with(refreshed);
        self.store.save(&merged).await?;
        tracing::info!("mail credential refreshed");
        Ok(merged.access_token)
    }

    pub async fn status(&self) -> MailAuthStatus {
        if self.store.load().await.is_none() {
            return MailAuthStatus {
                connected: false,
                expired: false,
            };
        }
        match self.access_token().await {
            Ok(_) => MailAuthStatus {
                connected: true,
                expired: false,
            },
            Err(err) => {
                tracing::warn!(error = %err, "mail credential unusable");
                MailAuthStatus {
                    connected: true,
                    expired: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticExchange {
        refreshes: AtomicUsize,
        refresh_result: fn() -> Result<MailCredential, MailError>,
    }

    fn fresh_token() -> Result<MailCredential, MailError> {
        Ok(MailCredential {
            access_token: "refreshed".to_string(),
            refresh_token: None,
            scope: None,
            token_type: Some("Bearer".to_string()),
            expiry_date: Some((Utc::now() + Duration::hours(1)).timestamp_millis()),
        })
    }

    fn revoked() -> Result<MailCredential, MailError> {
        Err(MailError::CredentialExpired("invalid_grant".to_string()))
    }

    #[async_trait]
    impl TokenExchange for StaticExchange {
        fn authorize_url(&self) -> (String, String) {
            (
                "https://accounts.example.org/consent?state=abc".to_string(),
                "abc".to_string(),
            )
        }

        async fn exchange_code(&self, code: &str) -> Result<MailCredential, MailError> {
            Ok(MailCredential {
                access_token: format!("access-{code}"),
                refresh_token: None,
                scope: Some(GMAIL_SEND_SCOPE.to_string()),
                token_type: Some("Bearer".to_string()),
                expiry_date: None,
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<MailCredential, MailError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            (self.refresh_result)()
        }
    }

    fn expired_credential() -> MailCredential {
        MailCredential {
            access_token: "stale".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            scope: Some(GMAIL_SEND_SCOPE.to_string()),
            token_type: Some("Bearer".to_string()),
            expiry_date: Some((Utc::now() - Duration::minutes(5)).timestamp_millis()),
        }
    }

    fn manager(
        dir: &tempfile::TempDir,
        refresh_result: fn() -> Result<MailCredential, MailError>,
    ) -> (MailCredentials, CredentialStore, Arc<StaticExchange>) {
        let store = CredentialStore::new(dir.path().join("secrets").join("token.json"));
        let exchange = Arc::new(StaticExchange {
            refreshes: AtomicUsize::new(0),
            refresh_result,
        });
        let credentials = MailCredentials::new(store.clone(), Some(exchange.clone()));
        (credentials, store, exchange)
    }

    #[tokio::test]
    async fn status_without_credential_is_disconnected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (credentials, _, _) = manager(&dir, fresh_token);
        assert_eq!(
            credentials.status().await,
            MailAuthStatus {
                connected: false,
                expired: false
            }
        );
        assert!(matches!(
            credentials.access_token().await,
            Err(MailError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_refresh_token_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (credentials, store, exchange) = manager(&dir, fresh_token);
        store.save(&expired_credential()).await.expect("save");

        let token = credentials.access_token().await.expect("refreshed token");
        assert_eq!(token, "refreshed");
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);

        let saved = store.load().await.expect("credential persisted");
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(saved.scope.as_deref(), Some(GMAIL_SEND_SCOPE));

        assert_eq!(credentials.access_token().await.unwrap(), "refreshed");
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unrefreshable_credential_reports_expired() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (credentials, store, _) = manager(&dir, revoked);
        store.save(&expired_credential()).await.expect("save");

        assert_eq!(
            credentials.status().await,
            MailAuthStatus {
                connected: true,
                expired: true
            }
        );
    }

    #[tokio::test]
    async fn connect_requires_issued_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (credentials, store, _) = manager(&dir, fresh_token);

        assert!(matches!(
            credentials.connect("code-1", "forged").await,
            Err(MailError::InvalidState)
        ));
        assert!(store.load().await.is_none());

        let url = credentials.authorize_url().await.expect("consent url");
        assert!(url.contains("state=abc"));
        credentials.connect("code-1", "abc").await.expect("connect");
        assert_eq!(store.load().await.unwrap().access_token, "access-code-1");

        assert!(matches!(
            credentials.connect("code-2", "abc").await,
            Err(MailError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn unconfigured_client_cannot_start_consent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let credentials =
            MailCredentials::new(CredentialStore::new(dir.path().join("token.json")), None);
        assert!(matches!(
            credentials.authorize_url().await,
            Err(MailError::NotConfigured)
        ));
    }

    #[test]
    fn reads_google_token_file_layout() {
        let credential: MailCredential = serde_json::from_str(
            r#"{"access_token":"ya29","refresh_token":"1//r","scope":"https://www.googleapis.com/auth/gmail.send","token_type":"Bearer","expiry_date":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(credential.expires_at().map(|at| at.timestamp()), Some(1_700_000_000));
        assert!(credential.is_expired(Utc::now()));
    }

    #[test]
    fn google_client_requires_id_and_secret() {
        let config = MailConfig {
            client_id: Some("client".to_string()),
            client_secret: None,
            redirect_uri: "http://localhost:4000/api/admin/auth/callback".to_string(),
            credential_path: PathBuf::from("secrets/token.json"),
            from: "Momentum Sports Africa".to_string(),
        };
        assert!(GoogleOAuthClient::from_config(&config).unwrap().is_none());

        let config = MailConfig {
            client_secret: Some("secret".to_string()),
            ..config
        };
        let client = GoogleOAuthClient::from_config(&config).unwrap().expect("client");
        let (url, state) = client.authorize_url();
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains(&format!("state={state}")));
    }
}
