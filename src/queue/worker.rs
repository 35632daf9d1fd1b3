use std::sync::Arc;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;
use crate::remote::{BlobOptions, BlobStore, FileRecord, FileRecordSink, IdentityProvider};
use super::compress::{compress_or_original, Compressor};
use super::errors::{Result, UploadError};
use super::task::FileSource;
use super::types::UploadId;

/// Callbacks from a running pipeline (and its ticker) back to the queue worker
#[derive(Debug)]
pub(crate) enum PipelineEvent {
    Compressed {
        upload_id: UploadId,
        attempt: u32,
        compressed_size: u64,
    },
    Tick {
        upload_id: UploadId,
        attempt: u32,
    },
    /// Blob accepted, metadata insert still pending
    Transferred {
        upload_id: UploadId,
        attempt: u32,
    },
    Finished {
        upload_id: UploadId,
        attempt: u32,
        result: Result<String>,
    },
}

/// Everything a pipeline needs from outside the queue
pub(crate) struct Collaborators {
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) records: Arc<dyn FileRecordSink>,
    pub(crate) compressor: Arc<dyn Compressor>,
    pub(crate) cache_control: String,
    pub(crate) upsert: bool,
}

/// `{user}/{millis}-{suffix}.{ext}`; the random suffix keeps same-millisecond uploads apart
pub fn storage_path(user_id: &str, source: &FileSource) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let stem = format!("{}/{}-{}", user_id, Utc::now().timestamp_millis(), &suffix[..8]);

    match source.extension() {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Runs one attempt of one task: compress, upload, record
pub(crate) struct UploadWorker {
    pub(crate) upload_id: UploadId,
    pub(crate) attempt: u32,
    pub(crate) source: FileSource,
    pub(crate) folder_id: Option<String>,
    pub(crate) compress: bool,
    pub(crate) collaborators: Arc<Collaborators>,
    pub(crate) cancellation_token: CancellationToken,
    pub(crate) event_tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl UploadWorker {
    pub(crate) async fn run(self) {
        let result = tokio::select! {
            result = self.execute() => result,
            _ = self.cancellation_token.cancelled() => Err(UploadError::Cancelled),
        };

        // 取消由管理器处理，不上报
        if let Err(UploadError::Cancelled) = result {
            debug!(upload_id = %self.upload_id, attempt = self.attempt, "Pipeline cancelled");
            return;
        }

        let _ = self.event_tx.send(PipelineEvent::Finished {
            upload_id: self.upload_id,
            attempt: self.attempt,
            result,
        });
    }

    async fn execute(&self) -> Result<String> {
        let payload = if self.compress {
            let payload = self.compress_payload().await;
            let _ = self.event_tx.send(PipelineEvent::Compressed {
                upload_id: self.upload_id,
                attempt: self.attempt,
                compressed_size: payload.size(),
            });
            payload
        } else {
            self.source.clone()
        };

        let user = self
            .collaborators
            .identity
            .current_user()
            .await?
            .ok_or(UploadError::NotAuthenticated)?;

        let storage_path = storage_path(&user.id, &self.source);
        let options = BlobOptions {
            content_type: payload.mime_type.clone(),
            cache_control: self.collaborators.cache_control.clone(),
            upsert: self.collaborators.upsert,
        };

        self.collaborators
            .blobs
            .upload(&storage_path, payload.data.clone(), &options)
            .await
            .map_err(UploadError::transport)?;

        let _ = self.event_tx.send(PipelineEvent::Transferred {
            upload_id: self.upload_id,
            attempt: self.attempt,
        });

        let record = FileRecord {
            owner: user.id,
            name: self.source.name.clone(),
            size: payload.size(),
            mime_type: self.source.mime_type.clone(),
            storage_path: storage_path.clone(),
            folder_id: self.folder_id.clone(),
        };

        // 元数据写入失败时 blob 不会被清理
        self.collaborators
            .records
            .insert_file_record(&record)
            .await
            .map_err(UploadError::metadata)?;

        Ok(storage_path)
    }

    /// Image work runs on the blocking pool; a panic there counts as a compression failure
    async fn compress_payload(&self) -> FileSource {
        let compressor = self.collaborators.compressor.clone();
        let source = self.source.clone();

        match tokio::task::spawn_blocking(move || compress_or_original(compressor.as_ref(), source)).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(upload_id = %self.upload_id, error = %err, "Compression task failed, uploading original");
                self.source.clone()
            }
        }
    }
}
