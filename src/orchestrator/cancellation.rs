//! 取消协调 - 编排层
//!
//! 取消是协作式的：只设置标志，正在进行的协作服务调用不会被打断，
//! 批处理器在安全点检查标志后停止。

use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::infrastructure::TaskRegistry;
use crate::models::{CancelOutcome, ProgressEvent, TaskId, TaskStatus};
use crate::orchestrator::cleanup::GracePeriodCleanup;

/// 未提供原因时使用的取消原因
pub const DEFAULT_CANCEL_REASON: &str = "User requested cancellation";

/// 取消协调器
#[derive(Clone)]
pub struct CancellationCoordinator {
    registry: Arc<TaskRegistry>,
    cleanup: GracePeriodCleanup,
}

impl CancellationCoordinator {
    pub fn new(registry: Arc<TaskRegistry>, cleanup: GracePeriodCleanup) -> Self {
        Self { registry, cleanup }
    }

    /// 取消任务
    ///
    /// # 返回
    /// - `Cancelled`：本次请求让任务进入了已取消状态
    /// - `AlreadyCompleted`：任务已经结束（仍在宽限期内）
    /// - `TaskError::NotFound`：任务不存在或宽限期已过
    pub async fn cancel(&self, id: &TaskId, reason: Option<String>) -> AppResult<CancelOutcome> {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());

        let entry = self
            .registry
            .known(id)
            .await
            .ok_or_else(|| AppError::task_not_found(id.to_string()))?;

        if !self.registry.is_active(id).await || entry.status().is_terminal() {
            info!("[任务 {}] 取消请求：任务已结束", id);
            return Ok(CancelOutcome::AlreadyCompleted);
        }

        entry.request_cancel(&reason);

        if self
            .cleanup
            .finalize(&entry, ProgressEvent::cancelled(&reason))
            .await
        {
            info!("[任务 {}] 🛑 已取消: {}", id, reason);
            return Ok(CancelOutcome::Cancelled);
        }

        // 批处理器先看到标志并完成了取消收尾
        if entry.status() == TaskStatus::Cancelled {
            return Ok(CancelOutcome::Cancelled);
        }

        info!("[任务 {}] 取消请求与任务完成竞争失败，任务已完成", id);
        Ok(CancelOutcome::AlreadyCompleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::infrastructure::ProgressChannel;
    use crate::models::{FileMetadata, FileType, ProcessingMode, TaskEntry, TaskKind, UnitProgress};
    use std::time::Duration;

    fn setup() -> (Arc<TaskRegistry>, GracePeriodCleanup, CancellationCoordinator) {
        let registry = Arc::new(TaskRegistry::new());
        let cleanup = GracePeriodCleanup::new(registry.clone(), Duration::from_secs(30));
        let coordinator = CancellationCoordinator::new(registry.clone(), cleanup.clone());
        (registry, cleanup, coordinator)
    }

    async fn register(registry: &TaskRegistry) -> (Arc<TaskEntry>, ProgressChannel) {
        let entry = Arc::new(TaskEntry::new(
            TaskKind::SingleUnit,
            ProcessingMode::LlmEnhanced,
            FileMetadata {
                original_filename: "receipt.jpg".to_string(),
                file_size_bytes: 4096,
                mime_type: "image/jpeg".to_string(),
                detected_file_type: FileType::Image,
            },
        ));
        let channel = ProgressChannel::new(entry.id, 8);
        registry.register(entry.clone(), channel.clone()).await;
        entry.transition(TaskStatus::Processing);
        (entry, channel)
    }

    #[tokio::test]
    async fn test_cancel_active_task() {
        let (registry, _cleanup, coordinator) = setup();
        let (entry, channel) = register(&registry).await;

        let outcome = coordinator.cancel(&entry.id, None).await.unwrap();

        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert!(entry.is_cancel_requested());
        assert_eq!(entry.status(), TaskStatus::Cancelled);
        assert_eq!(
            entry.snapshot().cancellation_reason.as_deref(),
            Some(DEFAULT_CANCEL_REASON)
        );

        let mut sub = channel.attach().unwrap();
        assert_eq!(
            sub.next().await.unwrap(),
            ProgressEvent::cancelled(DEFAULT_CANCEL_REASON)
        );
    }

    #[tokio::test]
    async fn test_cancel_unknown_task_is_not_found() {
        let (_registry, _cleanup, coordinator) = setup();
        let err = coordinator.cancel(&TaskId::new(), None).await.unwrap_err();
        assert!(matches!(err, AppError::Task(TaskError::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_terminal_within_and_after_grace() {
        let (registry, cleanup, coordinator) = setup();
        let (entry, _channel) = register(&registry).await;
        cleanup
            .finalize(&entry, ProgressEvent::Completed(UnitProgress::default()))
            .await;

        let outcome = coordinator
            .cancel(&entry.id, Some("too late".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyCompleted);
        assert_eq!(entry.status(), TaskStatus::Completed);
        assert_eq!(entry.snapshot().cancellation_reason, None);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(coordinator.cancel(&entry.id, None).await.is_err());
    }

    #[tokio::test]
    async fn test_second_cancel_reports_already_completed() {
        let (registry, _cleanup, coordinator) = setup();
        let (entry, _channel) = register(&registry).await;

        assert_eq!(
            coordinator
                .cancel(&entry.id, Some("first".to_string()))
                .await
                .unwrap(),
            CancelOutcome::Cancelled
        );
        assert_eq!(
            coordinator.cancel(&entry.id, None).await.unwrap(),
            CancelOutcome::AlreadyCompleted
        );
        assert_eq!(entry.cancellation_reason().as_deref(), Some("first"));
    }
}
