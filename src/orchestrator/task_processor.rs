//! 任务处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个服务的入口编排器，负责：
//!
//! 1. **准入控制**：并发任务数上限（信号量），超限直接拒绝
//! 2. **任务登记**：创建任务条目与进度通道，登记到注册表
//! 3. **后台处理**：为每个任务派生独立的 tokio 任务（PDF 渲染 → 分批处理）
//! 4. **收尾**：任何退出路径（包括 panic）都会以终止事件结束任务
//! 5. **查询**：订阅进度、查询状态、取消任务

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, TaskError};
use crate::infrastructure::{ProgressChannel, ProgressSubscriber, TaskRegistry};
use crate::models::{
    CancelOutcome, FileType, ProcessingMode, ProcessingOptions, ProcessingStep, ProgressEvent,
    SubmitRequest, SubmitResponse, TaskEntry, TaskId, TaskKind, TaskSnapshot, TaskStatus,
    UnitPayload,
};
use crate::orchestrator::batch_processor::{BatchOutcome, PageBatchCoordinator};
use crate::orchestrator::cancellation::{CancellationCoordinator, DEFAULT_CANCEL_REASON};
use crate::orchestrator::cleanup::GracePeriodCleanup;
use crate::services::{Enhancer, PageRenderer, Recognizer};
use crate::workflow::UnitFlow;

/// 外部协作服务集合
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn Recognizer>,
    pub enhancer: Option<Arc<dyn Enhancer>>,
    pub renderer: Arc<dyn PageRenderer>,
}

/// 任务处理器（克隆共享同一份状态）
#[derive(Clone)]
pub struct TaskProcessor {
    config: Arc<Config>,
    registry: Arc<TaskRegistry>,
    cleanup: GracePeriodCleanup,
    cancellation: CancellationCoordinator,
    admission: Arc<Semaphore>,
    collaborators: Collaborators,
}

impl TaskProcessor {
    pub fn new(config: Arc<Config>, collaborators: Collaborators) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let cleanup = GracePeriodCleanup::new(registry.clone(), config.grace_period());
        let cancellation = CancellationCoordinator::new(registry.clone(), cleanup.clone());
        let admission = Arc::new(Semaphore::new(config.max_concurrent_tasks));

        Self {
            config,
            registry,
            cleanup,
            cancellation,
            admission,
            collaborators,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// 提交任务，立即返回；处理在后台进行
    ///
    /// 上传文件在交给任务条目之前由本函数负责，任何提前返回都会删除它
    pub async fn submit(&self, request: SubmitRequest) -> AppResult<SubmitResponse> {
        let SubmitRequest {
            file_path,
            metadata,
            mut options,
        } = request;
        let upload = TempPath::from_path(file_path);

        let permit = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| TaskError::TooManyTasks {
                limit: self.config.max_concurrent_tasks,
            })?;

        options.fill_recognition_defaults(
            self.config.default_threshold,
            self.config.default_contrast_level,
        );
        options.validate()?;

        let file_type = metadata.detected_file_type;
        let kind = TaskKind::for_file(file_type, options.pages.clone());
        let estimated_units = match &kind {
            TaskKind::SingleUnit => 1,
            TaskKind::MultiUnit {
                requested_pages: Some(pages),
            } => pages.len(),
            TaskKind::MultiUnit {
                requested_pages: None,
            } => 1,
        };
        let estimated_duration = estimate_duration(
            file_type,
            options.mode,
            metadata.file_size_bytes,
            estimated_units,
        );

        let entry = Arc::new(TaskEntry::new(kind, options.mode, metadata));
        let file_path = upload.keep().map_err(|e| e.error)?;
        entry.add_resource(&file_path);
        let channel = ProgressChannel::new(entry.id, self.config.channel_capacity);
        self.registry.register(entry.clone(), channel.clone()).await;

        entry.transition(TaskStatus::Processing);
        channel.publish(ProgressEvent::status_update(
            ProcessingStep::Upload,
            5.0,
            None,
            estimated_units,
        ));

        info!(
            "[任务 {}] 📥 已接收: {} ({}, {} 字节, 模式 {:?})",
            entry.id,
            entry.metadata.original_filename,
            file_type.as_str(),
            entry.metadata.file_size_bytes,
            options.mode
        );

        let response = SubmitResponse {
            task_id: entry.id.to_string(),
            file_type,
            processing_mode: options.mode,
            status: TaskStatus::Processing.as_str().to_string(),
            created_at: entry.created_at,
            estimated_duration,
            file_metadata: entry.metadata.clone(),
        };

        self.spawn_task(entry, channel, file_path, options, estimated_units, permit);
        Ok(response)
    }

    /// 派生后台任务；内层任务 panic 时以 Failed 收尾
    fn spawn_task(
        &self,
        entry: Arc<TaskEntry>,
        channel: ProgressChannel,
        file_path: PathBuf,
        options: ProcessingOptions,
        estimated_units: usize,
        permit: OwnedSemaphorePermit,
    ) {
        let processor = self.clone();
        tokio::spawn(async move {
            let _permit = permit;

            let worker = tokio::spawn({
                let processor = processor.clone();
                let entry = entry.clone();
                async move {
                    processor
                        .process(&entry, &channel, &file_path, &options, estimated_units)
                        .await
                }
            });

            let terminal = match worker.await {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    error!("[任务 {}] ❌ 处理过程中发生错误: {}", entry.id, e);
                    ProgressEvent::failed(e.to_string())
                }
                Err(e) => {
                    error!("[任务 {}] 任务执行失败: {}", entry.id, e);
                    ProgressEvent::failed(format!("任务执行失败: {}", e))
                }
            };

            processor.cleanup.finalize(&entry, terminal).await;
        });
    }

    /// 处理单个任务，返回终止事件
    async fn process(
        &self,
        entry: &TaskEntry,
        channel: &ProgressChannel,
        file_path: &Path,
        options: &ProcessingOptions,
        estimated_units: usize,
    ) -> AppResult<ProgressEvent> {
        channel.publish(ProgressEvent::status_update(
            ProcessingStep::Validation,
            10.0,
            None,
            estimated_units,
        ));

        // PDF 页面图片放在临时目录中，函数返回时自动删除
        let (payloads, _pages_dir) = match &entry.kind {
            TaskKind::SingleUnit => (vec![UnitPayload::new(1, file_path)], None),
            TaskKind::MultiUnit { requested_pages } => {
                let dir = tempfile::Builder::new().prefix("ocr-pages-").tempdir()?;
                let payloads = self
                    .render_pages(
                        entry,
                        channel,
                        file_path,
                        dir.path(),
                        options,
                        requested_pages.as_deref(),
                    )
                    .await?;
                (payloads, Some(dir))
            }
        };

        if entry.is_cancel_requested() {
            return Ok(ProgressEvent::cancelled(cancel_reason(entry)));
        }

        info!(
            "[任务 {}] 🔍 开始识别，共 {} 个单元",
            entry.id,
            payloads.len()
        );

        let flow = UnitFlow::new(
            self.collaborators.recognizer.clone(),
            self.collaborators.enhancer.clone(),
            options,
        );
        let outcome = PageBatchCoordinator::new(self.config.batch_size)
            .run(entry, &flow, &payloads, channel)
            .await;

        Ok(match outcome {
            BatchOutcome::Finished(progress) => ProgressEvent::Completed(progress),
            BatchOutcome::Cancelled { executed_units } => {
                info!(
                    "[任务 {}] 🛑 已停止，完成 {} 个单元",
                    entry.id, executed_units
                );
                ProgressEvent::cancelled(cancel_reason(entry))
            }
        })
    }

    /// 渲染 PDF 并按页码选择生成单元输入
    async fn render_pages(
        &self,
        entry: &TaskEntry,
        channel: &ProgressChannel,
        pdf: &Path,
        out_dir: &Path,
        options: &ProcessingOptions,
        requested_pages: Option<&[usize]>,
    ) -> AppResult<Vec<UnitPayload>> {
        channel.publish(ProgressEvent::status_update(
            ProcessingStep::ImageExtraction,
            15.0,
            None,
            requested_pages.map(|p| p.len()).unwrap_or(1),
        ));

        let dpi = options.dpi.unwrap_or(self.config.pdf_dpi);
        let images = self
            .collaborators
            .renderer
            .render(pdf, dpi, out_dir)
            .await
            .map_err(|e| AppError::task_aborted(e.to_string()))?;

        let pages = select_pages(images, requested_pages, self.config.max_pdf_pages)?;
        info!("[任务 {}] 📄 待处理页面: {} 页", entry.id, pages.len());
        Ok(pages)
    }

    /// 订阅任务进度（只允许一个订阅者）
    ///
    /// 任务已结束但还没有人订阅时，宽限期内仍可订阅并读到全部事件
    pub async fn subscribe(&self, id: &TaskId) -> AppResult<ProgressSubscriber> {
        let channel = self
            .registry
            .claim_stream(id)
            .await
            .ok_or_else(|| AppError::task_not_found(id.to_string()))?;
        Ok(channel.attach()?)
    }

    /// 查询任务状态（宽限期内的已结束任务同样可查）
    pub async fn status(&self, id: &TaskId) -> AppResult<TaskSnapshot> {
        self.registry
            .known(id)
            .await
            .map(|entry| entry.snapshot())
            .ok_or_else(|| AppError::task_not_found(id.to_string()))
    }

    pub async fn cancel(&self, id: &TaskId, reason: Option<String>) -> AppResult<CancelOutcome> {
        self.cancellation.cancel(id, reason).await
    }

    pub async fn active_count(&self) -> usize {
        self.registry.active_count().await
    }

    pub async fn known_count(&self) -> usize {
        self.registry.known_count().await
    }
}

fn cancel_reason(entry: &TaskEntry) -> String {
    entry
        .cancellation_reason()
        .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string())
}

/// 按页码选择过滤渲染结果；超出页数上限时中止任务
fn select_pages(
    images: Vec<PathBuf>,
    requested: Option<&[usize]>,
    max_pages: usize,
) -> AppResult<Vec<UnitPayload>> {
    let page_count = images.len();
    let selected: Vec<UnitPayload> = match requested {
        Some(pages) => {
            if let Some(missing) = pages.iter().find(|&&p| p > page_count) {
                return Err(TaskError::InvalidPageSelection {
                    reason: format!("第 {} 页不存在，PDF 共 {} 页", missing, page_count),
                }
                .into());
            }
            pages
                .iter()
                .map(|&p| UnitPayload::new(p, images[p - 1].clone()))
                .collect()
        }
        None => images
            .into_iter()
            .enumerate()
            .map(|(i, path)| UnitPayload::new(i + 1, path))
            .collect(),
    };

    if selected.len() > max_pages {
        warn!("PDF 页数超出上限: {} > {}", selected.len(), max_pages);
        return Err(AppError::task_aborted(format!(
            "PDF 共 {} 页，超过上限 {} 页",
            selected.len(),
            max_pages
        )));
    }
    Ok(selected)
}

/// 预计处理时长（秒）
///
/// 每单元基准时间 × 单元数 × (1 + 文件大小/10MB × 0.2)，保留一位小数
pub fn estimate_duration(
    file_type: FileType,
    mode: ProcessingMode,
    file_size: usize,
    units: usize,
) -> f64 {
    let base = match (file_type, mode) {
        (FileType::Image, ProcessingMode::Basic) => 2.0,
        (FileType::Image, ProcessingMode::LlmEnhanced) => 4.0,
        (FileType::Pdf, ProcessingMode::Basic) => 1.5,
        (FileType::Pdf, ProcessingMode::LlmEnhanced) => 3.0,
    };
    let size_factor = 1.0 + (file_size as f64 / (10.0 * 1024.0 * 1024.0)) * 0.2;
    let total = base * units.max(1) as f64 * size_factor;
    (total * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: usize) -> Vec<PathBuf> {
        (1..=n)
            .map(|i| PathBuf::from(format!("/tmp/page-{}.png", i)))
            .collect()
    }

    #[test]
    fn test_estimate_duration() {
        assert_eq!(
            estimate_duration(FileType::Image, ProcessingMode::Basic, 0, 1),
            2.0
        );
        // 10MB → ×1.2
        assert_eq!(
            estimate_duration(FileType::Pdf, ProcessingMode::LlmEnhanced, 10 * 1024 * 1024, 2),
            7.2
        );
    }

    #[test]
    fn test_select_requested_pages_keeps_page_numbers() {
        let selected = select_pages(images(5), Some(&[2, 4]), 10).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].index, 2);
        assert_eq!(selected[1].image_path, PathBuf::from("/tmp/page-4.png"));
    }

    #[test]
    fn test_select_pages_rejects_out_of_range_and_over_limit() {
        assert!(select_pages(images(3), Some(&[4]), 10).is_err());
        assert!(select_pages(images(11), None, 10).is_err());
        assert_eq!(select_pages(images(3), None, 10).unwrap().len(), 3);
    }
}
