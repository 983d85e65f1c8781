#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use kitabya_api::blob::{BlobError, BlobStore, Upload};
use kitabya_api::identity::{IdentityError, IdentityResolver, VerifiedIdentity};
use kitabya_api::listings::ListingDraft;
use kitabya_api::push::{PushError, PushMessage, PushSender, PushTarget};
use kitabya_api::{AppState, AppStateInner};
use kitabya_db::Database;
use kitabya_db::models::SignIn;

pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Keeps URLs in memory. Uploads whose file name contains "fail" error out.
#[derive(Default)]
pub struct MemoryBlobStore {
    counter: AtomicUsize,
    pub live: Mutex<HashSet<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, folder: &str, upload: &Upload) -> Result<String, BlobError> {
        let name = upload.file_name.clone().unwrap_or_else(|| "blob".into());
        if name.contains("fail") {
            return Err(BlobError::Io(std::io::Error::other("disk full")));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let url = format!("https://blobs.test/{}/{}-{}", folder, n, name);
        self.live.lock().unwrap().insert(url.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Io(std::io::Error::other("permission denied")));
        }
        self.live.lock().unwrap().remove(url);
        self.deleted.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Accepts `token-<name>` as the identity `<name>@example.com`. Only the
/// name "pictured" carries a picture claim.
pub struct StaticIdentity;

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity, IdentityError> {
        if credential == "provider-down" {
            return Err(IdentityError::Unavailable("timeout".into()));
        }
        let name = credential
            .strip_prefix("token-")
            .ok_or_else(|| IdentityError::Invalid("unknown token".into()))?;
        Ok(VerifiedIdentity {
            subject: format!("sub-{}", name),
            email: format!("{}@example.com", name),
            name: Some(name.to_string()),
            picture: (name == "pictured").then(|| "https://idp.test/pictured.png".to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    Deliver,
    Unregistered,
    Fail,
}

pub struct RecordingPush {
    pub sent: Mutex<Vec<(PushTarget, PushMessage)>>,
    pub mode: Mutex<PushMode>,
}

impl RecordingPush {
    pub fn set_mode(&self, mode: PushMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<String, PushError> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            PushMode::Deliver => {
                let mut sent = self.sent.lock().unwrap();
                sent.push((target.clone(), message.clone()));
                Ok(format!("projects/test/messages/{}", sent.len()))
            }
            PushMode::Unregistered => Err(PushError::Unregistered),
            PushMode::Fail => Err(PushError::Delivery("503 Service Unavailable".into())),
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    pub blobs: Arc<MemoryBlobStore>,
    pub push: Arc<RecordingPush>,
}

impl TestApp {
    pub fn new() -> Self {
        let blobs = Arc::new(MemoryBlobStore::default());
        let push = Arc::new(RecordingPush {
            sent: Mutex::new(Vec::new()),
            mode: Mutex::new(PushMode::Deliver),
        });
        let state = Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            blobs: blobs.clone(),
            identity: Arc::new(StaticIdentity),
            push: push.clone(),
            admin_emails: vec![ADMIN_EMAIL.to_string()],
        });
        Self { state, blobs, push }
    }

    /// Local user for `name`, created the same way the auth middleware does.
    pub fn user(&self, name: &str) -> String {
        let email = format!("{}@example.com", name);
        let subject = format!("sub-{}", name);
        self.state
            .db
            .resolve_user(SignIn {
                subject: &subject,
                email: &email,
                name: Some(name),
                picture: None,
                grant_admin: email == ADMIN_EMAIL,
            })
            .unwrap()
            .id
    }
}

pub fn image(name: &str) -> Upload {
    Upload {
        file_name: Some(name.to_string()),
        content_type: Some("image/jpeg".into()),
        bytes: Bytes::from_static(b"\xff\xd8\xff fake jpeg"),
    }
}

pub fn draft(title: &str, price: f64) -> ListingDraft {
    ListingDraft {
        title: title.to_string(),
        price,
        condition: "good".into(),
        listing_type: "book".into(),
        language: "en".into(),
        description: format!("A copy of {}", title),
        category_id: None,
        sub_category_id: None,
        location_address: "Main St 1".into(),
        location_latitude: None,
        location_longitude: None,
    }
}
