//! 任务收尾 - 编排层
//!
//! 两阶段清理：
//! 1. 立即：推进到终止状态、发布终止事件、移出 Active、删除临时文件
//! 2. 宽限期 `G` 之后：移出 Known（之后查询返回 404）
//!
//! 完成与取消竞争时，只有状态 CAS 的赢家执行上述步骤。

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::infrastructure::TaskRegistry;
use crate::models::{ProgressEvent, TaskEntry, TaskId};

/// 宽限期清理器
#[derive(Clone)]
pub struct GracePeriodCleanup {
    registry: Arc<TaskRegistry>,
    grace_period: Duration,
}

impl GracePeriodCleanup {
    pub fn new(registry: Arc<TaskRegistry>, grace_period: Duration) -> Self {
        Self {
            registry,
            grace_period,
        }
    }

    /// 以 `terminal` 结束任务，返回本次调用是否赢得终止权
    pub async fn finalize(&self, entry: &Arc<TaskEntry>, terminal: ProgressEvent) -> bool {
        let Some(status) = terminal.terminal_status() else {
            warn!("[任务 {}] ⚠️ 非终止事件不能用于收尾: {:?}", entry.id, terminal);
            return false;
        };

        if !entry.finish(status) {
            debug!(
                "[任务 {}] 已处于终止状态 {}，跳过收尾",
                entry.id,
                entry.status().as_str()
            );
            return false;
        }

        if let Some(channel) = self.registry.active(&entry.id).await {
            channel.publish(terminal);
        }
        self.registry.deactivate(&entry.id).await;

        remove_resources(&entry.id, entry.take_resources()).await;
        self.schedule_forget(entry.id);

        info!("[任务 {}] 🏁 任务结束: {}", entry.id, status.as_str());
        true
    }

    /// 每个任务只调度一次（只有 `finalize` 的赢家会调用）
    fn schedule_forget(&self, id: TaskId) {
        let registry = self.registry.clone();
        let grace_period = self.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            registry.forget(&id).await;
        });
    }
}

/// 删除临时文件或目录；失败只记录日志
async fn remove_resources(id: &TaskId, resources: Vec<PathBuf>) {
    for path in resources {
        let result = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => debug!("[任务 {}] 已删除临时文件: {}", id, path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[任务 {}] ⚠️ 删除临时文件失败 {}: {}",
                id,
                path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ProgressChannel;
    use crate::models::{FileMetadata, FileType, ProcessingMode, TaskKind, TaskStatus, UnitProgress};

    fn entry() -> Arc<TaskEntry> {
        Arc::new(TaskEntry::new(
            TaskKind::SingleUnit,
            ProcessingMode::Basic,
            FileMetadata {
                original_filename: "a.jpg".to_string(),
                file_size_bytes: 10,
                mime_type: "image/jpeg".to_string(),
                detected_file_type: FileType::Image,
            },
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_phase_teardown() {
        let registry = Arc::new(TaskRegistry::new());
        let cleanup = GracePeriodCleanup::new(registry.clone(), Duration::from_secs(30));
        let task = entry();
        let channel = ProgressChannel::new(task.id, 8);
        registry.register(task.clone(), channel.clone()).await;

        assert!(
            cleanup
                .finalize(&task, ProgressEvent::Completed(UnitProgress::default()))
                .await
        );
        assert_eq!(task.status(), TaskStatus::Completed);
        assert!(channel.is_closed());
        assert!(!registry.is_active(&task.id).await);
        assert!(registry.known(&task.id).await.is_some());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(registry.known(&task.id).await.is_none());
    }

    #[tokio::test]
    async fn test_loser_does_nothing() {
        let registry = Arc::new(TaskRegistry::new());
        let cleanup = GracePeriodCleanup::new(registry.clone(), Duration::from_secs(30));
        let task = entry();
        let channel = ProgressChannel::new(task.id, 8);
        registry.register(task.clone(), channel.clone()).await;

        assert!(cleanup.finalize(&task, ProgressEvent::cancelled("user")).await);
        assert!(!cleanup.finalize(&task, ProgressEvent::failed("late")).await);
        assert_eq!(task.status(), TaskStatus::Cancelled);

        let mut sub = channel.attach().unwrap();
        assert_eq!(sub.next().await.unwrap(), ProgressEvent::cancelled("user"));
        assert!(sub.next().await.is_err());
    }

    #[tokio::test]
    async fn test_resources_removed() {
        let registry = Arc::new(TaskRegistry::new());
        let cleanup = GracePeriodCleanup::new(registry.clone(), Duration::from_secs(30));
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("upload.png");
        let pages = dir.path().join("pages");
        tokio::fs::write(&upload, b"png").await.unwrap();
        tokio::fs::create_dir(&pages).await.unwrap();
        tokio::fs::write(pages.join("page-1.png"), b"png").await.unwrap();

        let task = entry();
        task.add_resource(&upload);
        task.add_resource(&pages);
        task.add_resource(dir.path().join("missing.png"));
        registry
            .register(task.clone(), ProgressChannel::new(task.id, 4))
            .await;

        cleanup.finalize(&task, ProgressEvent::failed("boom")).await;

        assert!(!upload.exists());
        assert!(!pages.exists());
    }
}
