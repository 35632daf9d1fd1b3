//! In-process stand-ins for the hosted backend, used by tests and the demo binary

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use crate::queue::{Result, UploadError};
use super::{BlobOptions, BlobStore, FileRecord, FileRecordSink, IdentityProvider, User};

#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<User>,
}

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user: Some(User { id: user_id.into() }),
        }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.user.clone())
    }
}

/// Fails the next `remaining` calls with `message`
#[derive(Debug, Default)]
struct Rejection {
    remaining: AtomicUsize,
    message: String,
}

impl Rejection {
    fn new(count: usize, message: impl Into<String>) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            message: message.into(),
        }
    }

    fn take(&self) -> Option<String> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| self.message.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<(String, Bytes)>>,
    latency: Duration,
    rejection: Rejection,
    attempts: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload takes `latency` before it resolves
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject the next `count` uploads with `message`
    pub fn rejecting(mut self, count: usize, message: impl Into<String>) -> Self {
        self.rejection = Rejection::new(count, message);
        self
    }

    pub async fn objects(&self) -> Vec<(String, Bytes)> {
        self.objects.lock().await.clone()
    }

    pub async fn get(&self, path: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .await
            .iter()
            .find(|(stored, _)| stored == path)
            .map(|(_, data)| data.clone())
    }

    /// Number of upload calls started, including rejected and abandoned ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, payload: Bytes, options: &BlobOptions) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(message) = self.rejection.take() {
            return Err(UploadError::Transport(message));
        }

        let mut objects = self.objects.lock().await;
        if let Some(existing) = objects.iter_mut().find(|(stored, _)| stored == path) {
            if !options.upsert {
                return Err(UploadError::Transport("The resource already exists".to_string()));
            }
            existing.1 = payload;
            return Ok(());
        }

        objects.push((path.to_string(), payload));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryFileRecords {
    records: Mutex<Vec<FileRecord>>,
    latency: Duration,
    rejection: Rejection,
}

impl MemoryFileRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject the next `count` inserts with `message`
    pub fn rejecting(mut self, count: usize, message: impl Into<String>) -> Self {
        self.rejection = Rejection::new(count, message);
        self
    }

    pub async fn records(&self) -> Vec<FileRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl FileRecordSink for MemoryFileRecords {
    async fn insert_file_record(&self, record: &FileRecord) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(message) = self.rejection.take() {
            return Err(UploadError::Metadata(message));
        }

        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BlobOptions {
        BlobOptions {
            content_type: "text/plain".to_string(),
            cache_control: "3600".to_string(),
            upsert: false,
        }
    }

    #[tokio::test]
    async fn test_blob_store_rejects_then_accepts() {
        let store = MemoryBlobStore::new().rejecting(1, "bucket not found");

        let err = store.upload("u/a.txt", Bytes::from_static(b"a"), &options()).await.unwrap_err();
        assert_eq!(err.to_string(), "bucket not found");

        store.upload("u/a.txt", Bytes::from_static(b"a"), &options()).await.unwrap();
        assert_eq!(store.get("u/a.txt").await, Some(Bytes::from_static(b"a")));
        assert_eq!(store.attempts(), 2);
    }

    #[tokio::test]
    async fn test_blob_store_refuses_overwrite_without_upsert() {
        let store = MemoryBlobStore::new();
        store.upload("u/a.txt", Bytes::from_static(b"a"), &options()).await.unwrap();
        assert!(store.upload("u/a.txt", Bytes::from_static(b"b"), &options()).await.is_err());

        let upsert = BlobOptions { upsert: true, ..options() };
        store.upload("u/a.txt", Bytes::from_static(b"b"), &upsert).await.unwrap();
        assert_eq!(store.get("u/a.txt").await, Some(Bytes::from_static(b"b")));
    }

    #[tokio::test]
    async fn test_identity() {
        assert_eq!(StaticIdentity::signed_in("u1").current_user().await.unwrap(), Some(User { id: "u1".to_string() }));
        assert!(StaticIdentity::anonymous().current_user().await.unwrap().is_none());
    }
}
