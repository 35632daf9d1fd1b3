use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use crate::config::QueueConfig;
use super::types::UploadId;
use super::worker::PipelineEvent;

/// 单次估算结果
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressEstimate {
    /// 进度百分比（未取整）
    pub percentage: f64,
    /// 显示用的整数百分比
    pub progress: u8,
    /// 估算已上传字节数
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    /// 速度 (bytes/sec)
    pub speed: f64,
    /// 剩余时间（秒）
    pub time_remaining: Option<f64>,
}

/// Synthesises progress from wall-clock time.
///
/// The blob transport reports nothing until it resolves, so the estimate
/// assumes the upload runs no slower than `throughput_floor` and never takes
/// less than `min_duration`. The percentage is capped at `cap` until
/// [`ProgressEstimator::finished`] is called.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    total_bytes: u64,
    throughput_floor: f64,
    min_duration: Duration,
    cap: f64,
}

impl ProgressEstimator {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            throughput_floor: 500.0 * 1024.0,
            min_duration: Duration::from_secs(2),
            cap: 95.0,
        }
    }

    pub fn from_config(total_bytes: u64, config: &QueueConfig) -> Self {
        Self::new(total_bytes)
            .with_throughput_floor(config.throughput_floor)
            .with_min_duration(config.min_duration)
            .with_cap(config.progress_cap)
    }

    pub fn with_throughput_floor(mut self, bytes_per_sec: u64) -> Self {
        self.throughput_floor = bytes_per_sec.max(1) as f64;
        self
    }

    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub fn with_cap(mut self, cap: f64) -> Self {
        self.cap = cap.clamp(0.0, 100.0);
        self
    }

    /// Expected total duration of the transfer
    pub fn expected_duration(&self) -> Duration {
        let secs = (self.total_bytes as f64 / self.throughput_floor)
            .max(self.min_duration.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    pub fn estimate(&self, elapsed: Duration) -> ProgressEstimate {
        let elapsed = elapsed.as_secs_f64();
        let total = self.total_bytes as f64;
        let expected = self.expected_duration().as_secs_f64();

        let percentage = if expected > 0.0 {
            (elapsed / expected * 100.0).min(self.cap)
        } else {
            self.cap
        };

        let bytes_uploaded = percentage / 100.0 * total;
        let speed = if elapsed > 0.0 { bytes_uploaded / elapsed } else { 0.0 };
        let time_remaining = if speed > 0.0 {
            Some((total - bytes_uploaded) / speed)
        } else {
            None
        };

        ProgressEstimate {
            percentage,
            progress: percentage.round() as u8,
            bytes_uploaded: bytes_uploaded as u64,
            total_bytes: self.total_bytes,
            speed,
            time_remaining,
        }
    }

    /// The transport resolved: report completion regardless of extrapolation
    pub fn finished(&self, elapsed: Duration) -> ProgressEstimate {
        let elapsed = elapsed.as_secs_f64();
        let speed = if elapsed > 0.0 { self.total_bytes as f64 / elapsed } else { 0.0 };

        ProgressEstimate {
            percentage: 100.0,
            progress: 100,
            bytes_uploaded: self.total_bytes,
            total_bytes: self.total_bytes,
            speed,
            time_remaining: Some(0.0),
        }
    }
}

/// Emit a `Tick` for one attempt every `period` until the token is cancelled
pub(crate) fn spawn_ticker(
    upload_id: UploadId,
    attempt: u32,
    period: Duration,
    token: CancellationToken,
    event_tx: mpsc::UnboundedSender<PipelineEvent>,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        // 第一次 tick 在一个周期之后
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if event_tx.send(PipelineEvent::Tick { upload_id, attempt }).is_err() {
                        break;
                    }
                }
            }
        }
    })
}
