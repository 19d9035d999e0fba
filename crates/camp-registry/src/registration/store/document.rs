use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{ApplicationStore, StoreError};
use crate::registration::domain::{
    Application, ApplicationId, ApplicationStatus, EventType, NewApplication, NotificationKind,
    StatusSummary,
};

/// Document-collection provider: every application is one JSON document and
/// the collection is written back to a single file after each mutation.
///
/// Without a path the collection lives in memory only, which is what tests use.
pub struct DocumentApplicationStore {
    path: Option<PathBuf>,
    documents: Mutex<BTreeMap<ApplicationId, Application>>,
}

impl DocumentApplicationStore {
    pub fn open(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            documents: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            documents: Mutex::new(BTreeMap::new()),
        }
    }

    async fn persist(&self, documents: &BTreeMap<ApplicationId, Application>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let collection: Vec<&Application> = documents.values().collect();
        let encoded = serde_json::to_vec_pretty(&collection)?;
        let staging = staging_path(path);
        tokio::fs::write(&staging, encoded).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }

    /// Write the collection with `application` in place, then swap it in.
    /// A failed write leaves `documents` untouched.
    async fn replace(
        &self,
        documents: &mut BTreeMap<ApplicationId, Application>,
        application: Application,
    ) -> Result<Application, StoreError> {
        let mut next = documents.clone();
        next.insert(application.id.clone(), application.clone());
        self.persist(&next).await?;
        *documents = next;
        Ok(application)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

fn newest_first(mut applications: Vec<Application>) -> Vec<Application> {
    applications.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    applications
}

#[async_trait]
impl ApplicationStore for DocumentApplicationStore {
    async fn init(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "creating empty application collection");
                return self.persist(&BTreeMap::new()).await;
            }
            Err(err) => return Err(err.into()),
        };

        let loaded: Vec<Application> = if raw.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            serde_json::from_slice(&raw)?
        };

        let mut documents = self.documents.lock().await;
        documents.clear();
        for application in loaded {
            documents.insert(application.id.clone(), application);
        }
        tracing::info!(
            path = %path.display(),
            count = documents.len(),
            "loaded application collection"
        );
        Ok(())
    }

    async fn create_application(&self, new: NewApplication) -> Result<Application, StoreError> {
        let application = Application::create(new, Utc::now());
        let mut documents = self.documents.lock().await;
        self.replace(&mut documents, application).await
    }

    async fn list_applications(
        &self,
        filter: Option<EventType>,
    ) -> Result<Vec<Application>, StoreError> {
        let documents = self.documents.lock().await;
        let matching = documents
            .values()
            .filter(|application| filter.map_or(true, |event| application.event_type == event))
            .cloned()
            .collect();
        Ok(newest_first(matching))
    }

    async fn summary(&self, filter: Option<EventType>) -> Result<StatusSummary, StoreError> {
        let documents = self.documents.lock().await;
        Ok(documents
            .values()
            .filter(|application| filter.map_or(true, |event| application.event_type == event))
            .map(|application| application.status)
            .collect())
    }

    async fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        let documents = self.documents.lock().await;
        Ok(documents.get(id).cloned())
    }

    async fn update_application_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<Option<Application>, StoreError> {
        let mut documents = self.documents.lock().await;
        let Some(mut updated) = documents.get(id).cloned() else {
            return Ok(None);
        };
        updated.set_status(status);
        self.replace(&mut documents, updated).await.map(Some)
    }

    async fn update_application_email_status(
        &self,
        id: &ApplicationId,
        kind: NotificationKind,
        sent_at: DateTime<Utc>,
    ) -> Result<Option<Application>, StoreError> {
        let mut documents = self.documents.lock().await;
        let Some(mut updated) = documents.get(id).cloned() else {
            return Ok(None);
        };
        updated.payload.mark_email_sent(kind, sent_at);
        self.replace(&mut documents, updated).await.map(Some)
    }

    async fn import_application(&self, application: Application) -> Result<bool, StoreError> {
        let mut documents = self.documents.lock().await;
        if documents.contains_key(&application.id) {
            return Ok(false);
        }
        self.replace(&mut documents, application).await?;
        Ok(true)
    }
}
