use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use super::progress::ProgressEstimate;
use super::task::{FileSource, UploadTask};
use super::view::TaskView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UploadId(Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// 等待中（在队列中）
    Pending,
    /// 压缩中
    Compressing,
    /// 上传中
    Uploading,
    /// 已暂停
    Paused,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl UploadState {
    /// Occupies the single upload slot
    pub fn is_active(&self) -> bool {
        matches!(self, UploadState::Compressing | UploadState::Uploading)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Pending => "pending",
            UploadState::Compressing => "compressing",
            UploadState::Uploading => "uploading",
            UploadState::Paused => "paused",
            UploadState::Completed => "completed",
            UploadState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 管理器命令
pub enum ManagerCommand {
    /// 添加上传任务
    Enqueue {
        files: Vec<FileSource>,
        folder_id: Option<String>,
        reply: oneshot::Sender<Vec<UploadId>>,
    },
    /// 暂停任务
    Pause {
        upload_id: UploadId,
        reply: oneshot::Sender<()>,
    },
    /// 恢复任务
    Resume {
        upload_id: UploadId,
        reply: oneshot::Sender<()>,
    },
    /// 移除任务
    Remove {
        upload_id: UploadId,
        reply: oneshot::Sender<()>,
    },
    /// 清除已完成任务
    ClearCompleted {
        reply: oneshot::Sender<usize>,
    },
    /// 获取任务信息
    GetTask {
        upload_id: UploadId,
        reply: oneshot::Sender<Option<UploadTask>>,
    },
    /// 获取队列快照
    Snapshot {
        reply: oneshot::Sender<Vec<TaskView>>,
    },
    /// 关闭管理器
    Shutdown,
}

/// 上传事件
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 任务已添加
    TaskAdded {
        upload_id: UploadId,
    },
    /// 状态变更
    StateChanged {
        upload_id: UploadId,
        old_state: UploadState,
        new_state: UploadState,
    },
    /// 进度更新
    Progress {
        upload_id: UploadId,
        progress: ProgressEstimate,
    },
    /// 任务完成
    Completed {
        upload_id: UploadId,
        storage_path: String,
    },
    /// 任务失败
    Failed {
        upload_id: UploadId,
        error: String,
    },
    /// 任务已移除
    Removed {
        upload_id: UploadId,
    },
    /// 队列已空闲
    Idle,
}

impl UploadEvent {
    pub fn upload_id(&self) -> Option<UploadId> {
        match self {
            UploadEvent::TaskAdded { upload_id }
            | UploadEvent::StateChanged { upload_id, .. }
            | UploadEvent::Progress { upload_id, .. }
            | UploadEvent::Completed { upload_id, .. }
            | UploadEvent::Failed { upload_id, .. }
            | UploadEvent::Removed { upload_id } => Some(*upload_id),
            UploadEvent::Idle => None,
        }
    }
}

// 静态断言确保类型是 Send的
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<UploadTask>();
        assert_send::<UploadEvent>();
        assert_send::<ManagerCommand>();
    }
};
