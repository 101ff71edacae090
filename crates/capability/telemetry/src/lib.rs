//! 追踪初始化与处理计数。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub rows_parsed: u64,
    pub rows_skipped: u64,
    pub envelopes_published: u64,
    pub publish_failures: u64,
    pub files_drained: u64,
    pub checkpoints_resumed: u64,
    pub heartbeats_sent: u64,
    pub faults_reported: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    rows_parsed: AtomicU64,
    rows_skipped: AtomicU64,
    envelopes_published: AtomicU64,
    publish_failures: AtomicU64,
    files_drained: AtomicU64,
    checkpoints_resumed: AtomicU64,
    heartbeats_sent: AtomicU64,
    faults_reported: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            rows_parsed: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            envelopes_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            files_drained: AtomicU64::new(0),
            checkpoints_resumed: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            faults_reported: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_parsed: self.rows_parsed.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            envelopes_published: self.envelopes_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            files_drained: self.files_drained.load(Ordering::Relaxed),
            checkpoints_resumed: self.checkpoints_resumed.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            faults_reported: self.faults_reported.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录成功解析的数据行数。
pub fn record_row_parsed() {
    metrics().rows_parsed.fetch_add(1, Ordering::Relaxed);
}

/// 记录被跳过的畸形行数。
pub fn record_row_skipped() {
    metrics().rows_skipped.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布成功的信封数。
pub fn record_envelope_published() {
    metrics().envelopes_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布失败次数。
pub fn record_publish_failure() {
    metrics().publish_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录排空完成的文件数。
pub fn record_file_drained() {
    metrics().files_drained.fetch_add(1, Ordering::Relaxed);
}

/// 记录从既有检查点恢复的排空次数。
pub fn record_checkpoint_resumed() {
    metrics().checkpoints_resumed.fetch_add(1, Ordering::Relaxed);
}

/// 记录心跳发布次数。
pub fn record_heartbeat_sent() {
    metrics().heartbeats_sent.fetch_add(1, Ordering::Relaxed);
}

/// 记录上报的故障事件次数。
pub fn record_fault_reported() {
    metrics().faults_reported.fetch_add(1, Ordering::Relaxed);
}
