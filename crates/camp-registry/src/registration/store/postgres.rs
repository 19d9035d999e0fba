use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::types::Json;

use super::{ApplicationStore, StoreError};
use crate::config::PostgresConfig;
use crate::registration::domain::{
    Application, ApplicationId, ApplicationPayload, ApplicationStatus, EventType, NewApplication,
    NotificationKind, StatusSummary,
};

/// Column list for application queries.
const COLUMNS: &str = "id, created_at, status, event_type, payload";

const MAX_CONNECTIONS: u32 = 10;

/// Relational provider: fixed columns plus a JSONB payload per row.
pub struct PostgresApplicationStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: String,
    created_at: DateTime<Utc>,
    status: String,
    event_type: String,
    payload: Json<ApplicationPayload>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = StoreError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        let status = ApplicationStatus::parse(&row.status).ok_or_else(|| {
            StoreError::InvalidRecord {
                id: row.id.clone(),
                reason: format!("unknown status '{}'", row.status),
            }
        })?;
        let event_type = EventType::parse(&row.event_type).ok_or_else(|| {
            StoreError::InvalidRecord {
                id: row.id.clone(),
                reason: format!("unknown event type '{}'", row.event_type),
            }
        })?;

        Ok(Application {
            id: ApplicationId(row.id),
            created_at: row.created_at,
            status,
            event_type,
            payload: row.payload.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    total: i64,
    applied: i64,
    shortlisted: i64,
    selected: i64,
    paid: i64,
    rejected: i64,
}

impl From<SummaryRow> for StatusSummary {
    fn from(row: SummaryRow) -> Self {
        let count = |value: i64| u64::try_from(value).unwrap_or(0);
        StatusSummary {
            total: count(row.total),
            applied: count(row.applied),
            shortlisted: count(row.shortlisted),
            selected: count(row.selected),
            paid: count(row.paid),
            rejected: count(row.rejected),
        }
    }
}

impl PostgresApplicationStore {
    /// Build a lazily connecting pool. With no `DATABASE_URL` the libpq `PG*`
    /// variables are read by sqlx itself.
    pub fn connect_lazy(config: &PostgresConfig) -> Result<Self, StoreError> {
        if !config.is_configured() {
            return Err(StoreError::MissingConfiguration);
        }

        let mut options = match &config.url {
            Some(url) => PgConnectOptions::from_str(url)?,
            None => PgConnectOptions::new(),
        };
        if config.require_ssl {
            options = options.ssl_mode(PgSslMode::Require);
        }

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_lazy_with(options);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_rows(
        &self,
        filter: Option<EventType>,
    ) -> Result<Vec<ApplicationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM applications \
             WHERE ($1::text IS NULL OR event_type = $1) \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, ApplicationRow>(&query)
            .bind(filter.map(EventType::as_str))
            .fetch_all(&self.pool)
            .await
    }
}

#[async_trait]
impl ApplicationStore for PostgresApplicationStore {
    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS applications ( \
                id TEXT PRIMARY KEY, \
                created_at TIMESTAMPTZ NOT NULL, \
                status TEXT NOT NULL, \
                event_type TEXT NOT NULL, \
                payload JSONB NOT NULL \
             )",
        )
        .execute(&self.pool)
        .await?;
        tracing::info!("applications table ready");
        Ok(())
    }

    async fn create_application(&self, new: NewApplication) -> Result<Application, StoreError> {
        let application = Application::create(new, Utc::now());
        sqlx::query(
            "INSERT INTO applications (id, created_at, status, event_type, payload) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(application.id.as_str())
        .bind(application.created_at)
        .bind(application.status.label())
        .bind(application.event_type.as_str())
        .bind(Json(&application.payload))
        .execute(&self.pool)
        .await?;
        Ok(application)
    }

    async fn list_applications(
        &self,
        filter: Option<EventType>,
    ) -> Result<Vec<Application>, StoreError> {
        self.fetch_rows(filter)
            .await?
            .into_iter()
            .map(Application::try_from)
            .collect()
    }

    async fn summary(&self, filter: Option<EventType>) -> Result<StatusSummary, StoreError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            "SELECT \
                COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE status = 'applied') AS applied, \
                COUNT(*) FILTER (WHERE status = 'shortlisted') AS shortlisted, \
                COUNT(*) FILTER (WHERE status = 'selected') AS selected, \
                COUNT(*) FILTER (WHERE status = 'paid') AS paid, \
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected \
             FROM applications \
             WHERE ($1::text IS NULL OR event_type = $1)",
        )
        .bind(filter.map(EventType::as_str))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM applications WHERE id = $1");
        sqlx::query_as::<_, ApplicationRow>(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }

    async fn update_application_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<Option<Application>, StoreError> {
        let query = format!(
            "UPDATE applications SET status = $1 WHERE id = $2 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ApplicationRow>(&query)
            .bind(status.label())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }

    async fn update_application_email_status(
        &self,
        id: &ApplicationId,
        kind: NotificationKind,
        sent_at: DateTime<Utc>,
    ) -> Result<Option<Application>, StoreError> {
        // Keys come from the enum, never from input. An existing timestamp wins.
        let flag_key = kind.flag_key();
        let timestamp_key = kind.timestamp_key();
        let query = format!(
            "UPDATE applications \
             SET payload = jsonb_set( \
                 jsonb_set(COALESCE(payload, '{{}}'::jsonb), '{{{flag_key}}}', 'true'::jsonb, true), \
                 '{{{timestamp_key}}}', \
                 COALESCE(payload -> '{timestamp_key}', to_jsonb($2::text)), \
                 true \
             ) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ApplicationRow>(&query)
            .bind(id.as_str())
            .bind(sent_at.to_rfc3339_opts(SecondsFormat::Millis, true))
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }

    async fn import_application(&self, application: Application) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO applications (id, created_at, status, event_type, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(application.id.as_str())
        .bind(application.created_at)
        .bind(application.status.label())
        .bind(application.event_type.as_str())
        .bind(Json(&application.payload))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
