use serde::Serialize;
use super::task::UploadTask;
use super::types::{UploadId, UploadState};

/// One row of the queue as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: UploadId,
    pub file_name: String,
    pub file_size: u64,
    pub status: UploadState,
    pub progress: u8,
    pub speed: f64,
    pub time_remaining: Option<f64>,
    pub error: Option<String>,
}

impl From<&UploadTask> for TaskView {
    fn from(task: &UploadTask) -> Self {
        Self {
            id: task.id,
            file_name: task.source.name.clone(),
            file_size: task.original_size,
            status: task.state,
            progress: task.progress,
            speed: task.speed,
            time_remaining: task.time_remaining,
            error: task.error.clone(),
        }
    }
}

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec < KIB {
        format!("{:.0} B/s", bytes_per_sec)
    } else if bytes_per_sec < MIB {
        format!("{:.1} KB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.1} MB/s", bytes_per_sec / MIB)
    }
}

pub fn format_time_remaining(seconds: Option<f64>) -> String {
    match seconds {
        Some(secs) if secs >= 1.0 => {
            if secs < 60.0 {
                format!("{}s remaining", secs.round() as u64)
            } else {
                let minutes = (secs / 60.0).floor() as u64;
                let rest = (secs % 60.0).round() as u64;
                format!("{}m {}s remaining", minutes, rest)
            }
        }
        _ => "Almost done...".to_string(),
    }
}

pub fn format_file_size(bytes: u64) -> String {
    let size = bytes as f64;
    if size < KIB {
        format!("{} B", bytes)
    } else if size < MIB {
        format!("{:.1} KB", size / KIB)
    } else {
        format!("{:.1} MB", size / MIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::FileSource;

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(512.0), "512 B/s");
        assert_eq!(format_speed(1536.0), "1.5 KB/s");
        assert_eq!(format_speed(5.0 * MIB), "5.0 MB/s");
    }

    #[test]
    fn test_format_time_remaining() {
        assert_eq!(format_time_remaining(None), "Almost done...");
        assert_eq!(format_time_remaining(Some(0.4)), "Almost done...");
        assert_eq!(format_time_remaining(Some(42.4)), "42s remaining");
        assert_eq!(format_time_remaining(Some(125.0)), "2m 5s remaining");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(900), "900 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10.0 MB");
    }

    #[test]
    fn test_view_from_task() {
        let task = UploadTask::new(FileSource::new("a.txt", "text/plain", vec![0u8; 12]), None);
        let view = TaskView::from(&task);
        assert_eq!(view.id, task.id);
        assert_eq!(view.file_name, "a.txt");
        assert_eq!(view.file_size, 12);
        assert_eq!(view.status, UploadState::Pending);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json["timeRemaining"].is_null());
    }
}
