//! Collaborators the queue talks to: identity lookup, blob storage and the file table

mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use crate::queue::Result;

pub use http::HttpBackend;

/// The signed-in account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
}

/// Options sent along with a blob upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobOptions {
    pub content_type: String,
    pub cache_control: String,
    pub upsert: bool,
}

/// Row inserted into the file table once the blob is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "user_id")]
    pub owner: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub storage_path: String,
    pub folder_id: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` when nobody is signed in
    async fn current_user(&self) -> Result<Option<User>>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, payload: Bytes, options: &BlobOptions) -> Result<()>;
}

#[async_trait]
pub trait FileRecordSink: Send + Sync {
    async fn insert_file_record(&self, record: &FileRecord) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_wire_shape() {
        let record = FileRecord {
            owner: "user-1".to_string(),
            name: "a.txt".to_string(),
            size: 3,
            mime_type: "text/plain".to_string(),
            storage_path: "user-1/1700000000000-ab12cd34.txt".to_string(),
            folder_id: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["user_id"], "user-1");
        assert_eq!(value["mime_type"], "text/plain");
        assert!(value["folder_id"].is_null());
    }
}
