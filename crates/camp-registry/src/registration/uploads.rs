use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use tokio::io::AsyncWriteExt;

const MAX_BASE_LEN: usize = 50;
const FALLBACK_BASE: &str = "video";
/// Incoming files are written here first and renamed into the root once the
/// submission is accepted.
const STAGING_DIR: &str = ".staging";

/// Local-disk storage for submitted media, exposed under `/uploads`.
#[derive(Debug, Clone)]
pub struct UploadStorage {
    root: PathBuf,
    public_base_url: String,
}

/// A received file sitting in the staging area, not yet published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub original_name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Open staging file that request chunks are appended to.
#[derive(Debug)]
pub struct StagingFile {
    original_name: String,
    path: PathBuf,
    file: tokio::fs::File,
    size: u64,
}

/// A file written by [`UploadStorage::persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub file_name: String,
    pub path: PathBuf,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to prepare upload directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write upload {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl UploadStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| UploadError::Prepare {
                path: self.root.clone(),
                source,
            })
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Open a fresh staging file for an incoming upload.
    pub async fn stage(&self, original_name: &str) -> Result<StagingFile, UploadError> {
        let dir = self.staging_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| UploadError::Prepare {
                path: dir.clone(),
                source,
            })?;

        let nonce: u128 = rand::thread_rng().gen();
        let path = dir.join(format!("{nonce:032x}.part"));
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| UploadError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(StagingFile {
            original_name: original_name.to_string(),
            path,
            file,
            size: 0,
        })
    }

    /// Stage an in-memory payload in one go.
    pub async fn stage_bytes(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<UploadedFile, UploadError> {
        let mut staging = self.stage(original_name).await?;
        if let Err(err) = staging.write(bytes).await {
            staging.abandon().await;
            return Err(err);
        }
        staging.finish().await
    }

    /// Move a staged file into the root under a collision-resistant name
    /// derived from its original name.
    pub async fn persist(&self, upload: &UploadedFile) -> Result<StoredUpload, UploadError> {
        self.ensure_root().await?;

        let file_name = unique_file_name(&upload.original_name);
        let path = self.root.join(&file_name);
        tokio::fs::rename(&upload.path, &path)
            .await
            .map_err(|source| UploadError::Write {
                path: path.clone(),
                source,
            })?;

        let url = self.public_url(&file_name);
        tracing::debug!(file = %file_name, size = upload.size, "stored upload");
        Ok(StoredUpload {
            file_name,
            path,
            url,
        })
    }

    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, file_name)
    }

    /// Best-effort removal of files whose record was never written.
    pub async fn discard(&self, uploads: &[StoredUpload]) {
        for upload in uploads {
            remove_quietly(&upload.path, "failed to remove orphaned upload").await;
        }
    }

    /// Best-effort removal of staged files that will never be published.
    pub async fn discard_staged(&self, files: &[UploadedFile]) {
        for file in files {
            remove_quietly(&file.path, "failed to remove staged upload").await;
        }
    }
}

impl StagingFile {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|source| UploadError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    /// Flush and close. A file that cannot be flushed is removed.
    pub async fn finish(mut self) -> Result<UploadedFile, UploadError> {
        let flushed = self.file.flush().await;
        if let Err(source) = flushed {
            let path = self.path.clone();
            self.abandon().await;
            return Err(UploadError::Write { path, source });
        }
        Ok(UploadedFile {
            original_name: self.original_name,
            path: self.path,
            size: self.size,
        })
    }

    pub async fn abandon(self) {
        let StagingFile { path, file, .. } = self;
        drop(file);
        remove_quietly(&path, "failed to remove staged upload").await;
    }
}

async fn remove_quietly(path: &Path, message: &'static str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "{message}"),
    }
}

/// `<safe-base>-<epochMillis>-<random>.<ext>`
pub fn unique_file_name(original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let nonce: u32 = rand::thread_rng().gen_range(0..=1_000_000_000);
    let (base, extension) = split_name(original_name);
    match extension {
        Some(ext) => format!("{base}-{millis}-{nonce}.{ext}"),
        None => format!("{base}-{millis}-{nonce}"),
    }
}

fn split_name(original_name: &str) -> (String, Option<String>) {
    // Browsers may send a full client path; only the last segment counts.
    let name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);

    let (stem, extension) = match name.rfind('.') {
        Some(index) if index > 0 => (&name[..index], Some(&name[index + 1..])),
        _ => (name, None),
    };

    let base: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_BASE_LEN)
        .collect();
    let base = if base.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        base
    };

    let extension = extension
        .map(|ext| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
        })
        .filter(|ext| !ext.is_empty());

    (base, extension)
}
