use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::config::QueueConfig;
use super::progress::{spawn_ticker, ProgressEstimator};
use super::task::{FileSource, UploadTask};
use super::types::{ManagerCommand, UploadEvent, UploadId, UploadState};
use super::view::TaskView;
use super::worker::{Collaborators, PipelineEvent, UploadWorker};

/// Per-task resources of the running attempt. Dropping it releases all of them.
struct ActiveUpload {
    attempt: u32,
    cancellation_token: CancellationToken,
    pipeline: JoinHandle<()>,
    ticker: Option<JoinHandle<()>>,
    estimator: Option<ProgressEstimator>,
    transfer_started: Option<Instant>,
    /// Blob accepted; only the metadata insert remains
    transferred: bool,
}

impl ActiveUpload {
    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn elapsed(&self) -> std::time::Duration {
        self.transfer_started
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }
}

impl Drop for ActiveUpload {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
        self.stop_ticker();
        self.pipeline.abort();
    }
}

pub struct UploadQueueWorker {
    config: QueueConfig,
    collaborators: Arc<Collaborators>,
    /// 按加入顺序排列
    tasks: Vec<UploadTask>,
    active: HashMap<UploadId, ActiveUpload>,
    /// A task reached a terminal state since the last `Idle`
    settled_since_idle: bool,

    event_tx: broadcast::Sender<UploadEvent>,
    pipeline_tx: mpsc::UnboundedSender<PipelineEvent>,
    pipeline_rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl UploadQueueWorker {
    pub(crate) async fn run(
        config: QueueConfig,
        collaborators: Arc<Collaborators>,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            config,
            collaborators,
            tasks: Vec::new(),
            active: HashMap::new(),
            settled_since_idle: false,
            event_tx,
            pipeline_tx,
            pipeline_rx,
        };

        // 主事件循环
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(ManagerCommand::Shutdown) | None => break,
                        Some(command) => worker.handle_command(command),
                    }
                }
                Some(event) = worker.pipeline_rx.recv() => {
                    worker.handle_pipeline_event(event);
                }
            }
        }

        // 释放所有进行中的上传
        worker.active.clear();
        debug!("Upload queue worker stopped");
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Enqueue { files, folder_id, reply } => {
                let ids = self.enqueue(files, folder_id);
                let _ = reply.send(ids);
            }
            ManagerCommand::Pause { upload_id, reply } => {
                self.pause(upload_id);
                let _ = reply.send(());
            }
            ManagerCommand::Resume { upload_id, reply } => {
                self.resume(upload_id);
                let _ = reply.send(());
            }
            ManagerCommand::Remove { upload_id, reply } => {
                self.remove(upload_id);
                let _ = reply.send(());
            }
            ManagerCommand::ClearCompleted { reply } => {
                let removed = self.clear_completed();
                let _ = reply.send(removed);
            }
            ManagerCommand::GetTask { upload_id, reply } => {
                let task = self.tasks.iter().find(|task| task.id == upload_id).cloned();
                let _ = reply.send(task);
            }
            ManagerCommand::Snapshot { reply } => {
                let rows = self.tasks.iter().map(TaskView::from).collect();
                let _ = reply.send(rows);
            }
            ManagerCommand::Shutdown => {}
        }
    }

    fn enqueue(&mut self, files: Vec<FileSource>, folder_id: Option<String>) -> Vec<UploadId> {
        if files.is_empty() {
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(files.len());
        for source in files {
            let task = UploadTask::new(source, folder_id.clone());
            let upload_id = task.id;
            debug!(upload_id = %upload_id, file = %task.source.name, size = task.original_size, "Task queued");
            self.tasks.push(task);
            ids.push(upload_id);
            self.emit(UploadEvent::TaskAdded { upload_id });
        }

        info!(count = ids.len(), "Files added to upload queue");
        self.admit();
        ids
    }

    fn pause(&mut self, upload_id: UploadId) {
        let Some(index) = self.position(upload_id) else { return };
        if self.tasks[index].state != UploadState::Uploading {
            debug!(upload_id = %upload_id, state = %self.tasks[index].state, "Pause ignored");
            return;
        }
        // blob 已写入，中断元数据写入只会留下孤立对象
        if self.active.get(&upload_id).is_some_and(|active| active.transferred) {
            debug!(upload_id = %upload_id, "Pause ignored, blob already stored");
            return;
        }

        self.active.remove(&upload_id);
        self.set_state(index, UploadState::Paused);
        info!(upload_id = %upload_id, progress = self.tasks[index].progress, "Upload paused");
        self.admit();
    }

    fn resume(&mut self, upload_id: UploadId) {
        let Some(index) = self.position(upload_id) else { return };
        if self.tasks[index].state != UploadState::Paused {
            debug!(upload_id = %upload_id, state = %self.tasks[index].state, "Resume ignored");
            return;
        }

        // 不支持断点续传，从头开始
        self.tasks[index].reset_progress();
        self.set_state(index, UploadState::Pending);
        self.admit();
    }

    fn remove(&mut self, upload_id: UploadId) {
        let Some(index) = self.position(upload_id) else { return };

        self.active.remove(&upload_id);
        self.tasks.remove(index);
        self.emit(UploadEvent::Removed { upload_id });
        debug!(upload_id = %upload_id, "Task removed");
        self.admit();
    }

    fn clear_completed(&mut self) -> usize {
        let (completed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| task.state == UploadState::Completed);
        self.tasks = kept;

        for task in &completed {
            self.emit(UploadEvent::Removed { upload_id: task.id });
        }

        self.admit();
        completed.len()
    }

    /// Start the earliest pending task unless one already holds the slot
    fn admit(&mut self) {
        if self.tasks.iter().any(|task| task.state.is_active()) {
            return;
        }

        match self.tasks.iter().position(|task| task.state == UploadState::Pending) {
            Some(index) => self.start_pipeline(index),
            None => {
                if self.settled_since_idle {
                    self.settled_since_idle = false;
                    info!("Upload queue idle");
                    self.emit(UploadEvent::Idle);
                }
            }
        }
    }

    fn start_pipeline(&mut self, index: usize) {
        let compress = self.config.compression.enabled && self.tasks[index].source.is_image();

        let task = &mut self.tasks[index];
        task.attempt += 1;
        task.reset_progress();
        task.error = None;
        task.compressed_size = None;

        let upload_id = task.id;
        let attempt = task.attempt;
        let cancellation_token = CancellationToken::new();

        let worker = UploadWorker {
            upload_id,
            attempt,
            source: task.source.clone(),
            folder_id: task.folder_id.clone(),
            compress,
            collaborators: self.collaborators.clone(),
            cancellation_token: cancellation_token.clone(),
            event_tx: self.pipeline_tx.clone(),
        };
        let pipeline = tokio::spawn(worker.run());

        self.active.insert(upload_id, ActiveUpload {
            attempt,
            cancellation_token,
            pipeline,
            ticker: None,
            estimator: None,
            transfer_started: None,
            transferred: false,
        });

        info!(upload_id = %upload_id, attempt, compress, "Upload admitted");
        if compress {
            self.set_state(index, UploadState::Compressing);
        } else {
            self.begin_transfer(index);
        }
    }

    /// Enter `Uploading` and start the estimator ticker for this attempt
    fn begin_transfer(&mut self, index: usize) {
        self.set_state(index, UploadState::Uploading);

        let task = &self.tasks[index];
        let transfer_size = task.compressed_size.unwrap_or(task.original_size);
        let estimator = ProgressEstimator::from_config(transfer_size, &self.config);

        if let Some(active) = self.active.get_mut(&task.id) {
            active.estimator = Some(estimator);
            active.transfer_started = Some(Instant::now());
            active.ticker = Some(spawn_ticker(
                task.id,
                active.attempt,
                self.config.tick_interval,
                active.cancellation_token.child_token(),
                self.pipeline_tx.clone(),
            ));
        }
    }

    fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        let (upload_id, attempt) = match &event {
            PipelineEvent::Compressed { upload_id, attempt, .. }
            | PipelineEvent::Tick { upload_id, attempt }
            | PipelineEvent::Transferred { upload_id, attempt }
            | PipelineEvent::Finished { upload_id, attempt, .. } => (*upload_id, *attempt),
        };

        // 已移除、已暂停或属于旧一轮的回调直接丢弃
        let current = self.active.get(&upload_id).map(|active| active.attempt);
        let index = match (current, self.position(upload_id)) {
            (Some(current), Some(index)) if current == attempt => index,
            _ => {
                debug!(upload_id = %upload_id, attempt, "Dropping stale pipeline event");
                return;
            }
        };

        match event {
            PipelineEvent::Compressed { compressed_size, .. } => {
                let task = &mut self.tasks[index];
                debug!(upload_id = %upload_id, original = task.original_size, compressed = compressed_size, "Compression finished");
                task.compressed_size = Some(compressed_size);
                self.begin_transfer(index);
            }
            PipelineEvent::Tick { .. } => {
                if self.tasks[index].state != UploadState::Uploading {
                    return;
                }
                let Some(active) = self.active.get(&upload_id) else { return };
                let Some(estimator) = &active.estimator else { return };

                let mut estimate = estimator.estimate(active.elapsed());
                let task = &mut self.tasks[index];
                task.apply_estimate(&estimate);
                estimate.progress = task.progress;
                self.emit(UploadEvent::Progress { upload_id, progress: estimate });
            }
            PipelineEvent::Transferred { .. } => {
                let Some(active) = self.active.get_mut(&upload_id) else { return };
                active.stop_ticker();
                active.transferred = true;
                // 之后排队到达的 tick 不再生效
                let estimator = active
                    .estimator
                    .take()
                    .unwrap_or_else(|| ProgressEstimator::new(self.tasks[index].original_size));
                let estimate = estimator.finished(active.elapsed());

                let task = &mut self.tasks[index];
                task.apply_estimate(&estimate);
                task.mark_transferred();
                self.emit(UploadEvent::Progress { upload_id, progress: estimate });
            }
            PipelineEvent::Finished { result, .. } => {
                self.active.remove(&upload_id);
                self.settled_since_idle = true;

                match result {
                    Ok(storage_path) => {
                        self.tasks[index].storage_path = Some(storage_path.clone());
                        self.set_state(index, UploadState::Completed);
                        info!(upload_id = %upload_id, storage_path = %storage_path, "Upload completed");
                        self.emit(UploadEvent::Completed { upload_id, storage_path });
                    }
                    Err(err) => {
                        let error = err.to_string();
                        self.tasks[index].error = Some(error.clone());
                        self.set_state(index, UploadState::Failed);
                        warn!(upload_id = %upload_id, error = %error, "Upload failed");
                        self.emit(UploadEvent::Failed { upload_id, error });
                    }
                }

                self.admit();
            }
        }
    }

    fn position(&self, upload_id: UploadId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == upload_id)
    }

    fn set_state(&mut self, index: usize, new_state: UploadState) {
        let task = &mut self.tasks[index];
        let old_state = task.transition(new_state);
        let upload_id = task.id;

        if old_state != new_state {
            self.emit(UploadEvent::StateChanged { upload_id, old_state, new_state });
        }
    }

    fn emit(&self, event: UploadEvent) {
        // 没有订阅者时发送会失败，忽略
        let _ = self.event_tx.send(event);
    }
}
