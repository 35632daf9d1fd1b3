use std::path::Path;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use super::errors::{Result, UploadError};
use super::progress::ProgressEstimate;
use super::types::{UploadId, UploadState};

/// A file handed to the queue: name, declared media type and contents
#[derive(Clone)]
pub struct FileSource {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl FileSource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read a local file, guessing the media type from its extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| UploadError::ParamError(format!("Invalid file name: {:?}", path)))?
            .to_string();

        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::ParamError("Not a file".to_string()));
        }

        let data = tokio::fs::read(path).await?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self::new(name, mime_type, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Text after the last dot of the file name
    pub fn extension(&self) -> Option<&str> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: UploadId,
    pub source: FileSource,
    pub folder_id: Option<String>,
    pub state: UploadState,
    /// 进度百分比 0..=100
    pub progress: u8,
    /// 估算速度 (bytes/sec)
    pub speed: f64,
    /// 估算剩余时间（秒）
    pub time_remaining: Option<f64>,
    pub error: Option<String>,
    pub storage_path: Option<String>,
    pub original_size: u64,
    pub compressed_size: Option<u64>,
    /// Bumped on every admission so callbacks from an older run can be told apart
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadTask {
    pub fn new(source: FileSource, folder_id: Option<String>) -> Self {
        let original_size = source.size();

        Self {
            id: UploadId::new(),
            source,
            folder_id,
            state: UploadState::Pending,
            progress: 0,
            speed: 0.0,
            time_remaining: None,
            error: None,
            storage_path: None,
            original_size,
            compressed_size: None,
            attempt: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `to`, returning the previous state
    pub(crate) fn transition(&mut self, to: UploadState) -> UploadState {
        let from = self.state;
        self.state = to;

        match to {
            UploadState::Uploading => {
                self.started_at = Some(Utc::now());
            }
            UploadState::Completed | UploadState::Failed => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }

        from
    }

    /// Clear attempt-scoped figures before a fresh run
    pub(crate) fn reset_progress(&mut self) {
        self.progress = 0;
        self.speed = 0.0;
        self.time_remaining = None;
    }

    /// Apply an estimator tick; displayed progress never moves backwards
    pub(crate) fn apply_estimate(&mut self, estimate: &ProgressEstimate) {
        self.progress = self.progress.max(estimate.progress).min(100);
        self.speed = estimate.speed.max(0.0);
        self.time_remaining = estimate.time_remaining;
    }

    pub(crate) fn mark_transferred(&mut self) {
        self.progress = 100;
        self.time_remaining = Some(0.0);
    }
}
