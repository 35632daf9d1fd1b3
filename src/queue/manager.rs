use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::config::QueueConfig;
use crate::remote::{BlobStore, FileRecordSink, IdentityProvider};
use super::compress::{Compressor, ImageCompressor};
use super::errors::{Result, UploadError};
use super::manager_worker::UploadQueueWorker;
use super::task::{FileSource, UploadTask};
use super::types::{ManagerCommand, UploadEvent, UploadId};
use super::view::TaskView;
use super::worker::Collaborators;

/// Cheap, cloneable front door to the queue worker
#[derive(Clone)]
pub struct UploadQueue {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
}

/// 上传队列句柄 - 包含队列和工作线程
pub struct UploadQueueHandle {
    pub queue: UploadQueue,
    pub worker_handle: JoinHandle<()>,
}

impl UploadQueueHandle {
    /// Stop the worker; in-flight uploads are cancelled
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.queue.command_tx.send(ManagerCommand::Shutdown).await;
        drop(self.queue);
        self.worker_handle
            .await
            .map_err(|err| UploadError::internal_error(format!("Worker panic: {}", err)))
    }
}

impl UploadQueue {
    pub fn builder() -> UploadQueueBuilder {
        UploadQueueBuilder::new()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| UploadError::internal_error("Manager shut down"))?;

        // 等待响应
        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))
    }

    /// Add files at the root; returns their ids in submission order
    pub async fn enqueue(&self, files: Vec<FileSource>) -> Result<Vec<UploadId>> {
        self.request(|reply| ManagerCommand::Enqueue { files, folder_id: None, reply }).await
    }

    /// Add files that belong to `folder_id`
    pub async fn enqueue_into(&self, folder_id: impl Into<String>, files: Vec<FileSource>) -> Result<Vec<UploadId>> {
        let folder_id = Some(folder_id.into());
        self.request(|reply| ManagerCommand::Enqueue { files, folder_id, reply }).await
    }

    /// Pause upload; no-op unless the task is uploading
    pub async fn pause(&self, upload_id: UploadId) -> Result<()> {
        self.request(|reply| ManagerCommand::Pause { upload_id, reply }).await
    }

    /// Resume upload from the beginning; no-op unless paused
    pub async fn resume(&self, upload_id: UploadId) -> Result<()> {
        self.request(|reply| ManagerCommand::Resume { upload_id, reply }).await
    }

    /// Remove task in any state
    pub async fn remove(&self, upload_id: UploadId) -> Result<()> {
        self.request(|reply| ManagerCommand::Remove { upload_id, reply }).await
    }

    /// Drop every completed task, returning how many were removed
    pub async fn clear_completed(&self) -> Result<usize> {
        self.request(|reply| ManagerCommand::ClearCompleted { reply }).await
    }

    /// Get task
    pub async fn get_task(&self, upload_id: UploadId) -> Result<Option<UploadTask>> {
        self.request(|reply| ManagerCommand::GetTask { upload_id, reply }).await
    }

    /// Ordered rows for rendering
    pub async fn snapshot(&self) -> Result<Vec<TaskView>> {
        self.request(|reply| ManagerCommand::Snapshot { reply }).await
    }

    /// 订阅事件
    ///
    /// 注意：
    /// - 如果接收速度跟不上发送速度，可能会丢失事件（lagged error）
    /// - 每个订阅者都会收到完整的事件副本
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }
}

/// Wires the queue to its collaborators and spawns the worker
#[derive(Default)]
pub struct UploadQueueBuilder {
    config: QueueConfig,
    identity: Option<Arc<dyn IdentityProvider>>,
    blobs: Option<Arc<dyn BlobStore>>,
    records: Option<Arc<dyn FileRecordSink>>,
    compressor: Option<Arc<dyn Compressor>>,
}

impl UploadQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn file_records(mut self, records: Arc<dyn FileRecordSink>) -> Self {
        self.records = Some(records);
        self
    }

    /// Use one backend for identity, blobs and records
    pub fn backend<B>(self, backend: Arc<B>) -> Self
    where
        B: IdentityProvider + BlobStore + FileRecordSink + 'static,
    {
        self.identity(backend.clone())
            .blob_store(backend.clone())
            .file_records(backend)
    }

    /// Replace the default [`ImageCompressor`]
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Must be called inside a tokio runtime
    pub fn build(self) -> Result<UploadQueueHandle> {
        self.config.validate()?;

        let identity = self.identity
            .ok_or_else(|| UploadError::ParamError("identity provider not set".to_string()))?;
        let blobs = self.blobs
            .ok_or_else(|| UploadError::ParamError("blob store not set".to_string()))?;
        let records = self.records
            .ok_or_else(|| UploadError::ParamError("file record sink not set".to_string()))?;
        let compressor = self.compressor
            .unwrap_or_else(|| Arc::new(ImageCompressor::new(&self.config.compression)));

        let collaborators = Arc::new(Collaborators {
            identity,
            blobs,
            records,
            compressor,
            cache_control: self.config.remote.cache_control.clone(),
            upsert: self.config.remote.upsert,
        });

        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (event_tx, _) = broadcast::channel(self.config.event_capacity);

        let worker_handle = tokio::spawn(UploadQueueWorker::run(
            self.config,
            collaborators,
            command_rx,
            event_tx.clone(),
        ));

        Ok(UploadQueueHandle {
            queue: UploadQueue { command_tx, event_tx },
            worker_handle,
        })
    }
}
