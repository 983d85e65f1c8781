use std::sync::Arc;

use tracing::error;

use kitabya_db::Database;

use crate::blob::BlobStore;
use crate::error::ApiError;
use crate::identity::IdentityResolver;
use crate::push::PushSender;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler needs. Collaborators are trait objects so tests can
/// swap in fakes.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityResolver>,
    pub push: Arc<dyn PushSender>,
    /// Lowercased emails granted admin when their user is resolved.
    pub admin_emails: Vec<String>,
}

impl AppStateInner {
    /// Run a blocking database call off the async runtime.
    pub async fn with_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow::anyhow!("database task failed: {}", e))
            })?
            .map_err(ApiError::Internal)
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|a| a.eq_ignore_ascii_case(email))
    }
}
