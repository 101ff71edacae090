//! CSV 文件检查点：以 rename + delete 为提交原语的微型状态机。
//!
//! 不变式：排空开始后，原始文件与检查点文件至多存在其一
//! （改名瞬间除外）。检查点文件的存在即表示"这批数据在途，
//! 尚未完整发布"。

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 受监视文件的排空状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Checkpointed,
    Draining,
    Cleanup,
}

/// 单个受监视文件的检查点。
pub struct FileCheckpoint {
    original: PathBuf,
    checkpoint: PathBuf,
    state: DrainState,
    resumed: bool,
}

impl FileCheckpoint {
    pub fn new(original: &Path) -> Self {
        let checkpoint = PathBuf::from(format!("{}.backup.csv", original.display()));
        Self {
            original: original.to_path_buf(),
            checkpoint,
            state: DrainState::Idle,
            resumed: false,
        }
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    /// 本次排空是否从既有检查点恢复（上次排空被中断）。
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// 进入 Checkpointed：已有检查点直接恢复，否则把原始文件改名。
    /// 原始文件与检查点都不存在时返回 Ok(false)。
    pub async fn acquire(&mut self) -> std::io::Result<bool> {
        if tokio::fs::try_exists(&self.checkpoint).await? {
            self.resumed = true;
            self.state = DrainState::Checkpointed;
            debug!(
                target: "cfx.workflow",
                checkpoint = %self.checkpoint.display(),
                "checkpoint_resumed"
            );
            return Ok(true);
        }
        if !tokio::fs::try_exists(&self.original).await? {
            return Ok(false);
        }
        tokio::fs::rename(&self.original, &self.checkpoint).await?;
        self.state = DrainState::Checkpointed;
        debug!(
            target: "cfx.workflow",
            original = %self.original.display(),
            checkpoint = %self.checkpoint.display(),
            "checkpoint_created"
        );
        Ok(true)
    }

    /// 读出检查点的全部行并进入 Draining。
    pub async fn read_lines(&mut self) -> std::io::Result<Vec<String>> {
        self.state = DrainState::Draining;
        let raw = tokio::fs::read_to_string(&self.checkpoint).await?;
        Ok(raw.lines().map(|line| line.to_string()).collect())
    }

    /// 删除检查点并回到 Idle。
    ///
    /// 发布失败时同样执行（批次被放弃）。删除失败仅记日志，
    /// 该文件可能在下个周期被重复处理。
    pub async fn release(&mut self) {
        self.state = DrainState::Cleanup;
        if let Err(err) = tokio::fs::remove_file(&self.checkpoint).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    target: "cfx.workflow",
                    checkpoint = %self.checkpoint.display(),
                    error = %err,
                    "checkpoint_remove_failed"
                );
            }
        }
        self.state = DrainState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::{DrainState, FileCheckpoint};

    #[tokio::test]
    async fn acquire_renames_original_to_checkpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let original = dir.path().join("production.csv");
        tokio::fs::write(&original, "header\nrow").await.expect("write");

        let mut checkpoint = FileCheckpoint::new(&original);
        assert!(checkpoint.acquire().await.expect("acquire"));
        assert_eq!(checkpoint.state(), DrainState::Checkpointed);
        assert!(!checkpoint.resumed());

        // 改名后恰好只有检查点存在
        assert!(!original.exists());
        assert!(checkpoint.checkpoint_path().exists());
    }

    #[tokio::test]
    async fn acquire_resumes_existing_checkpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let original = dir.path().join("production.csv");
        tokio::fs::write(dir.path().join("production.csv.backup.csv"), "header\nrow")
            .await
            .expect("write");

        let mut checkpoint = FileCheckpoint::new(&original);
        assert!(checkpoint.acquire().await.expect("acquire"));
        assert!(checkpoint.resumed());
        let lines = checkpoint.read_lines().await.expect("lines");
        assert_eq!(lines, vec!["header".to_string(), "row".to_string()]);
    }

    #[tokio::test]
    async fn acquire_without_files_is_false() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut checkpoint = FileCheckpoint::new(&dir.path().join("absent.csv"));
        assert!(!checkpoint.acquire().await.expect("acquire"));
        assert_eq!(checkpoint.state(), DrainState::Idle);
    }

    #[tokio::test]
    async fn release_consumes_checkpoint_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let original = dir.path().join("status.csv");
        tokio::fs::write(&original, "header").await.expect("write");

        let mut checkpoint = FileCheckpoint::new(&original);
        assert!(checkpoint.acquire().await.expect("acquire"));
        checkpoint.release().await;
        assert_eq!(checkpoint.state(), DrainState::Idle);
        assert!(!checkpoint.checkpoint_path().exists());
        assert!(!original.exists());

        // 再次释放不报错
        checkpoint.release().await;
    }
}
