use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_service_routes;
use axum::http::HeaderValue;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use camp_registry::admin::{AdminSessions, FileSessionStore};
use camp_registry::api::RegistrationState;
use camp_registry::config::{AppConfig, ConfigError};
use camp_registry::error::AppError;
use camp_registry::notifications::{
    CredentialStore, GmailTransport, GoogleOAuthClient, MailCredentials, NotificationDispatcher,
    TokenExchange,
};
use camp_registry::registration::{store, RegistrationIntake, ReviewService, UploadStorage};
use camp_registry::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    if config.admin.password_is_default {
        warn!("ADMIN_PASSWORD not set; using the development default");
    }

    let application_store = store::from_config(&config.storage.provider)?;
    application_store.init().await?;
    info!(provider = config.storage.provider.name(), "application store ready");

    let uploads = UploadStorage::new(
        config.storage.upload_dir.clone(),
        config.server.public_base_url.clone(),
    );
    uploads.ensure_root().await?;

    let session_store = Arc::new(FileSessionStore::open(config.admin.token_path.clone()).await);
    let sessions = AdminSessions::new(config.admin.password.clone(), session_store);

    let token_exchange = GoogleOAuthClient::from_config(&config.mail)?
        .map(|client| Arc::new(client) as Arc<dyn TokenExchange>);
    if token_exchange.is_none() {
        warn!("mail OAuth client not configured; notification e-mail is disabled");
    }
    let credentials = Arc::new(MailCredentials::new(
        CredentialStore::new(config.mail.credential_path.clone()),
        token_exchange,
    ));

    let registration_state = RegistrationState {
        intake: Arc::new(RegistrationIntake::new(application_store.clone(), uploads)),
        review: Arc::new(ReviewService::new(application_store.clone())),
        sessions: Arc::new(sessions),
        dispatcher: Arc::new(NotificationDispatcher::new(
            application_store,
            credentials.clone(),
            Arc::new(GmailTransport::new(config.mail.from.clone())),
        )),
        credentials,
        max_upload_bytes: config.storage.max_upload_bytes,
    };

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        frontend_base_url: config.server.frontend_base_url.clone(),
    };

    let app = with_service_routes(registration_state)
        .nest_service("/uploads", ServeDir::new(&config.storage.upload_dir))
        .layer(Extension(app_state))
        .layer(cors_layer(&config.server.cors_origin)?)
        .layer(TraceLayer::new_for_http())
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "camp registration service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// `*` allows any origin; anything else is matched exactly.
fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let allow_origin = if origin == "*" {
        AllowOrigin::from(Any)
    } else {
        let value = HeaderValue::from_str(origin)
            .map_err(|_| ConfigError::InvalidCorsOrigin(origin.to_string()))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}
