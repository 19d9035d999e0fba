use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_UPLOAD_MAX_BYTES: usize = 200 * 1024 * 1024;
const DEV_ADMIN_PASSWORD: &str = "admin123";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the registration service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub admin: AdminConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match non_empty_var("APP_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort)?,
            None => DEFAULT_PORT,
        };

        let public_base_url = non_empty_var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{host}:{port}"));
        let frontend_base_url = non_empty_var("FRONTEND_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string());
        let cors_origin = non_empty_var("CORS_ORIGIN").unwrap_or_else(|| "*".to_string());

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let storage = StorageConfig::from_env()?;
        let admin = AdminConfig::from_env(environment)?;
        let mail = MailConfig::from_env(port);

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                public_base_url: trim_trailing_slash(public_base_url),
                frontend_base_url: trim_trailing_slash(frontend_base_url),
                cors_origin,
            },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            storage,
            admin,
            mail,
        })
    }
}

/// Settings controlling the HTTP server binding and the URLs it hands out.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix used when exposing uploaded files, e.g. `https://api.example.org`.
    pub public_base_url: String,
    /// Where the admin dashboard lives; `/admin/login` redirects there.
    pub frontend_base_url: String,
    pub cors_origin: String,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Which application store backs the service, plus upload handling.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    Postgres(PostgresConfig),
    Document { path: PathBuf },
}

impl StorageProvider {
    pub fn name(&self) -> &'static str {
        match self {
            StorageProvider::Postgres(_) => "postgres",
            StorageProvider::Document { .. } => "document",
        }
    }
}

/// Connection settings for the relational store.
///
/// `url` may be absent when libpq-style `PG*` variables are set instead;
/// the store refuses to start when neither is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub url: Option<String>,
    pub require_ssl: bool,
    pub has_libpq_env: bool,
}

impl PostgresConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.has_libpq_env
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let provider_name = env::var("DB_PROVIDER").unwrap_or_else(|_| "postgres".to_string());
        let provider = match provider_name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "" => StorageProvider::Postgres(PostgresConfig {
                url: non_empty_var("DATABASE_URL"),
                require_ssl: env::var("DATABASE_SSL")
                    .map(|value| value.trim().eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
                has_libpq_env: non_empty_var("PGHOST").is_some()
                    || non_empty_var("PGUSER").is_some(),
            }),
            "document" => StorageProvider::Document {
                path: non_empty_var("DOCUMENT_STORE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("data/applications.json")),
            },
            other => return Err(ConfigError::UnsupportedProvider(other.to_string())),
        };

        let upload_dir = non_empty_var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("uploads"));
        let max_upload_bytes = match non_empty_var("UPLOAD_MAX_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidUploadLimit)?,
            None => DEFAULT_UPLOAD_MAX_BYTES,
        };

        Ok(Self {
            provider,
            upload_dir,
            max_upload_bytes,
        })
    }
}

/// Shared admin secret and where issued sessions are kept.
#[derive(Clone)]
pub struct AdminConfig {
    pub password: String,
    pub password_is_default: bool,
    pub token_path: PathBuf,
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("password", &"<redacted>")
            .field("password_is_default", &self.password_is_default)
            .field("token_path", &self.token_path)
            .finish()
    }
}

impl AdminConfig {
    fn from_env(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let token_path = non_empty_var("ADMIN_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("secrets/admin_tokens.json"));

        let (password, password_is_default) = match non_empty_var("ADMIN_PASSWORD") {
            Some(password) => (password, false),
            None if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingAdminPassword)
            }
            None => (DEV_ADMIN_PASSWORD.to_string(), true),
        };

        Ok(Self {
            password,
            password_is_default,
            token_path,
        })
    }
}

/// OAuth client identity for the mail-sending account.
#[derive(Clone)]
pub struct MailConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub credential_path: PathBuf,
    pub from: String,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri)
            .field("credential_path", &self.credential_path)
            .field("from", &self.from)
            .finish()
    }
}

impl MailConfig {
    fn from_env(port: u16) -> Self {
        let redirect_uri = non_empty_var("SMTP_OAUTH2_REDIRECT_URI")
            .or_else(|| non_empty_var("GOOGLE_REDIRECT_URI"))
            .unwrap_or_else(|| format!("http://localhost:{port}/api/admin/auth/callback"));

        Self {
            client_id: non_empty_var("SMTP_OAUTH2_CLIENT_ID"),
            client_secret: non_empty_var("SMTP_OAUTH2_CLIENT_SECRET"),
            redirect_uri,
            credential_path: non_empty_var("MAIL_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("secrets/token.json")),
            from: non_empty_var("SMTP_FROM")
                .unwrap_or_else(|| "Momentum Sports Africa".to_string()),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn trim_trailing_slash(value: String) -> String {
    value.trim_end_matches('/').to_string()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidUploadLimit,
    UnsupportedProvider(String),
    MissingAdminPassword,
    InvalidCorsOrigin(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUploadLimit => {
                write!(f, "UPLOAD_MAX_BYTES must be a positive integer")
            }
            ConfigError::UnsupportedProvider(provider) => {
                write!(f, "unsupported DB_PROVIDER: {provider}")
            }
            ConfigError::MissingAdminPassword => {
                write!(f, "ADMIN_PASSWORD must be set in production")
            }
            ConfigError::InvalidCorsOrigin(origin) => {
                write!(f, "CORS_ORIGIN '{origin}' is not a valid header value")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidUploadLimit
            | ConfigError::UnsupportedProvider(_)
            | ConfigError::MissingAdminPassword
            | ConfigError::InvalidCorsOrigin(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "PUBLIC_BASE_URL",
            "FRONTEND_BASE_URL",
            "CORS_ORIGIN",
            "DB_PROVIDER",
            "DATABASE_URL",
            "DATABASE_SSL",
            "PGHOST",
            "PGUSER",
            "DOCUMENT_STORE_PATH",
            "UPLOAD_DIR",
            "UPLOAD_MAX_BYTES",
            "ADMIN_PASSWORD",
            "ADMIN_TOKEN_PATH",
            "SMTP_OAUTH2_CLIENT_ID",
            "SMTP_OAUTH2_CLIENT_SECRET",
            "SMTP_OAUTH2_REDIRECT_URI",
            "GOOGLE_REDIRECT_URI",
            "MAIL_TOKEN_PATH",
            "SMTP_FROM",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.public_base_url, "http://127.0.0.1:4000");
        assert_eq!(config.server.cors_origin, "*");
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
        assert!(config.admin.password_is_default);
        assert_eq!(
            config.mail.redirect_uri,
            "http://localhost:4000/api/admin/auth/callback"
        );
        match config.storage.provider {
            StorageProvider::Postgres(pg) => assert!(!pg.is_configured()),
            other => panic!("expected postgres provider, got {other:?}"),
        }
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 4000));
    }

    #[test]
    fn selects_document_provider() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DB_PROVIDER", "Document");
        env::set_var("DOCUMENT_STORE_PATH", "/tmp/camp/applications.json");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.storage.provider,
            StorageProvider::Document {
                path: PathBuf::from("/tmp/camp/applications.json")
            }
        );
    }

    #[test]
    fn rejects_unknown_provider() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DB_PROVIDER", "firestore");
        match AppConfig::load() {
            Err(ConfigError::UnsupportedProvider(name)) => assert_eq!(name, "firestore"),
            other => panic!("expected unsupported provider, got {other:?}"),
        }
    }

    #[test]
    fn production_requires_admin_password() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::MissingAdminPassword)
        ));

        env::set_var("ADMIN_PASSWORD", "s3cret");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.admin.password, "s3cret");
        assert!(!config.admin.password_is_default);
    }

    #[test]
    fn libpq_variables_count_as_postgres_configuration() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PGHOST", "db.internal");
        let config = AppConfig::load().expect("config loads");
        match config.storage.provider {
            StorageProvider::Postgres(pg) => {
                assert!(pg.url.is_none());
                assert!(pg.is_configured());
            }
            other => panic!("expected postgres provider, got {other:?}"),
        }
    }
}
