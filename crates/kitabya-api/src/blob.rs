use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("empty upload")]
    Empty,

    #[error("not a URL managed by this store: {0}")]
    ForeignUrl(String),

    #[error("blob storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stores uploaded files and hands back durable public URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, folder: &str, upload: &Upload) -> Result<String, BlobError>;

    async fn delete(&self, url: &str) -> Result<(), BlobError>;
}

/// Blob store on the local filesystem. Each blob lives at
/// `{dir}/{folder}/{uuid}.{ext}` and is published as
/// `{public_base}/{folder}/{uuid}.{ext}`.
pub struct LocalBlobStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalBlobStore {
    pub async fn new(dir: PathBuf, public_base: impl Into<String>) -> Result<Self, BlobError> {
        fs::create_dir_all(&dir).await?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a public URL back to its file, refusing anything outside `dir`.
    fn path_for(&self, url: &str) -> Result<PathBuf, BlobError> {
        let relative = url
            .strip_prefix(&self.public_base)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| BlobError::ForeignUrl(url.to_string()))?;

        let relative = Path::new(relative);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || relative.as_os_str().is_empty() {
            return Err(BlobError::ForeignUrl(url.to_string()));
        }
        Ok(self.dir.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, folder: &str, upload: &Upload) -> Result<String, BlobError> {
        if upload.bytes.is_empty() {
            return Err(BlobError::Empty);
        }

        let name = format!("{}.{}", Uuid::new_v4(), extension_for(upload));
        let folder_dir = self.dir.join(folder);
        fs::create_dir_all(&folder_dir).await?;

        let mut file = fs::File::create(folder_dir.join(&name)).await?;
        file.write_all(&upload.bytes).await?;
        file.flush().await?;

        Ok(format!("{}/{}/{}", self.public_base, folder, name))
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let path = self.path_for(url)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted blob {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// File extension from the client's file name, falling back to the MIME type.
fn extension_for(upload: &Upload) -> String {
    let from_name = upload
        .file_name
        .as_deref()
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());

    from_name.unwrap_or_else(|| {
        match upload.content_type.as_deref() {
            Some("image/jpeg") => "jpg",
            Some("image/png") => "png",
            Some("image/webp") => "webp",
            Some("image/gif") => "gif",
            _ => "bin",
        }
        .to_string()
    })
}
