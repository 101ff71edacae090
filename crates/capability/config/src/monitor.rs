use crate::LiveConfiguration;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 配置快照监视器。
///
/// 持有当前 [`LiveConfiguration`] 的 Arc，替换是原子的：
/// 读者看到旧快照或新快照，不会看到部分更新。
pub struct ConfigMonitor {
    current: RwLock<Arc<LiveConfiguration>>,
}

impl ConfigMonitor {
    pub fn new(initial: LiveConfiguration) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// 取当前快照。每个工作单元在入口处调用一次。
    pub fn current(&self) -> Arc<LiveConfiguration> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 整体替换快照。
    pub fn replace(&self, next: LiveConfiguration) {
        let next = Arc::new(next);
        info!(
            target: "cfx.config",
            protocol = ?next.protocol.kind,
            prefix = %next.publisher.prefix,
            unique_id = %next.machine_info.unique_id,
            heartbeat_frequency = next.machine_info.heartbeat_frequency,
            "configuration_replaced"
        );
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

/// 监视配置文件修改时间，变化时重读并替换快照。
///
/// 解析失败保留旧快照。任务随取消信号退出。
pub fn spawn_file_watch(
    monitor: Arc<ConfigMonitor>,
    path: PathBuf,
    poll: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_modified = modified_at(&path);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll) => {}
            }
            let modified = modified_at(&path);
            if modified == last_modified {
                continue;
            }
            last_modified = modified;
            match LiveConfiguration::from_file(&path) {
                Ok(next) => monitor.replace(next),
                Err(err) => {
                    warn!(
                        target: "cfx.config",
                        path = %path.display(),
                        error = %err,
                        "config_reload_failed"
                    );
                }
            }
        }
    })
}

fn modified_at(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::ConfigMonitor;
    use crate::{LiveConfiguration, Protocol};

    #[test]
    fn replace_swaps_whole_snapshot() {
        let monitor = ConfigMonitor::new(LiveConfiguration::default());
        assert_eq!(monitor.current().protocol.kind, Protocol::Amqp);

        let mut next = LiveConfiguration::default();
        next.protocol.kind = Protocol::Mqtt;
        next.publisher.prefix = "acme".to_string();
        monitor.replace(next);

        let snapshot = monitor.current();
        assert_eq!(snapshot.protocol.kind, Protocol::Mqtt);
        assert_eq!(snapshot.publisher.prefix, "acme");
    }

    #[test]
    fn earlier_snapshot_stays_immutable_after_replace() {
        let monitor = ConfigMonitor::new(LiveConfiguration::default());
        let before = monitor.current();

        let mut next = LiveConfiguration::default();
        next.publisher.prefix = "changed".to_string();
        monitor.replace(next);

        assert_eq!(before.publisher.prefix, "");
        assert_eq!(monitor.current().publisher.prefix, "changed");
    }
}
