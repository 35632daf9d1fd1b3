use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::queue::{Result, UploadError};

// 用于序列化 Duration（毫秒）
fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_duration_ms<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// 上传队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 进度估算刷新间隔
    #[serde(rename = "tick_interval_ms", serialize_with = "serialize_duration_ms", deserialize_with = "deserialize_duration_ms")]
    pub tick_interval: Duration,
    /// 假定的最低吞吐量 (bytes/sec)
    pub throughput_floor: u64,
    /// 估算的最短上传时长
    #[serde(rename = "min_duration_ms", serialize_with = "serialize_duration_ms", deserialize_with = "deserialize_duration_ms")]
    pub min_duration: Duration,
    /// 上传返回前进度上限
    pub progress_cap: f64,
    /// 事件广播缓存大小
    pub event_capacity: usize,
    /// 命令队列大小
    pub command_capacity: usize,
    pub log_filter: String,
    pub compression: CompressionConfig,
    pub remote: RemoteConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            throughput_floor: 500 * 1024,
            min_duration: Duration::from_secs(2),
            progress_cap: 95.0,
            event_capacity: 256,
            command_capacity: 100,
            log_filter: "info".to_string(),
            compression: CompressionConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// 最长边（像素）
    pub max_dimension: u32,
    /// 超过该大小的图片才会重新编码
    pub max_size_bytes: u64,
    pub jpeg_quality: u8,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_dimension: 1920,
            max_size_bytes: 1024 * 1024,
            jpeg_quality: 80,
        }
    }
}

/// Hosted backend settings used by [`crate::remote::HttpBackend`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub bucket: String,
    pub files_table: String,
    pub cache_control: String,
    pub upsert: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            bucket: "user-files".to_string(),
            files_table: "files".to_string(),
            cache_control: "3600".to_string(),
            upsert: false,
        }
    }
}

impl QueueConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: QueueConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(UploadError::ParamError("tick_interval_ms must be positive".to_string()));
        }
        if self.throughput_floor == 0 {
            return Err(UploadError::ParamError("throughput_floor must be positive".to_string()));
        }
        if !(0.0..=100.0).contains(&self.progress_cap) {
            return Err(UploadError::ParamError("progress_cap must be within 0..=100".to_string()));
        }
        if self.event_capacity == 0 || self.command_capacity == 0 {
            return Err(UploadError::ParamError("channel capacities must be positive".to_string()));
        }
        Ok(())
    }
}
