mod compress;
mod errors;
mod manager;
mod manager_worker;
mod progress;
mod task;
mod types;
mod view;
mod worker;

pub use compress::{Compressor, ImageCompressor};
pub use errors::{Result, UploadError};
pub use manager::{UploadQueue, UploadQueueBuilder, UploadQueueHandle};
pub use progress::{ProgressEstimate, ProgressEstimator};
pub use task::{FileSource, UploadTask};
pub use types::{UploadEvent, UploadId, UploadState};
pub use view::{format_file_size, format_speed, format_time_remaining, TaskView};
pub use worker::storage_path;
