pub mod config;
pub mod logging;
pub mod queue;
pub mod remote;

// 重新导出核心类型
pub use config::{CompressionConfig, QueueConfig, RemoteConfig};
pub use queue::{
    FileSource,
    UploadEvent,
    UploadId,
    UploadQueue,
    UploadQueueBuilder,
    UploadQueueHandle,
    UploadState,
    UploadTask,
    TaskView,
    UploadError,
    Result,
};
