//! 单元处理流程 - 流程层
//!
//! 核心职责：定义"一个单元"的完整处理流程
//!
//! 流程顺序：
//! 1. OCR 识别
//! 2. LLM 增强（仅 `llm_enhanced` 模式）
//! 3. 需要逐字输出且最终文本的服务支持流式时，转发 `TextChunk`
//!
//! 单元失败只记录在 `WorkUnit` 上，不会向上传播。

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::StreamExt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CollaboratorError;
use crate::infrastructure::ProgressChannel;
use crate::models::{
    ProcessingMode, ProcessingOptions, ProcessingStep, ProgressEvent, TimingBreakdown,
    UnitPayload, WorkUnit,
};
use crate::services::{EnhanceInput, Enhancer, RecognizeOptions, Recognizer, TextStream};
use crate::utils::logging::truncate_text;
use crate::workflow::unit_ctx::UnitCtx;

/// 单元处理流程
///
/// - 只依赖业务能力（services）
/// - 不持有任务状态，不关心批次
pub struct UnitFlow {
    recognizer: Arc<dyn Recognizer>,
    enhancer: Option<Arc<dyn Enhancer>>,
    recognize_options: RecognizeOptions,
    prompt: Option<String>,
    model: Option<String>,
    stream_text: bool,
}

impl UnitFlow {
    /// 创建新的单元处理流程
    ///
    /// `basic` 模式下忽略 `enhancer`
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        enhancer: Option<Arc<dyn Enhancer>>,
        options: &ProcessingOptions,
    ) -> Self {
        let enhancer = match options.mode {
            ProcessingMode::Basic => None,
            ProcessingMode::LlmEnhanced => enhancer,
        };

        let defaults = RecognizeOptions::default();
        Self {
            recognizer,
            enhancer,
            recognize_options: RecognizeOptions {
                threshold: options.threshold.unwrap_or(defaults.threshold),
                contrast_level: options.contrast_level.unwrap_or(defaults.contrast_level),
            },
            prompt: options.prompt.clone(),
            model: options.model.clone(),
            stream_text: options.stream_text,
        }
    }

    /// 处理一个单元，总是返回终态的 `WorkUnit`
    pub async fn run(
        &self,
        ctx: &UnitCtx,
        payload: &UnitPayload,
        channel: &ProgressChannel,
    ) -> WorkUnit {
        let mut unit = WorkUnit::pending(ctx.unit_index);
        unit.start();
        let mut timing = TimingBreakdown::default();

        match self.execute(ctx, payload, channel, &mut timing).await {
            Ok((text, model_used)) => {
                info!(
                    "{} ✓ 完成 (识别 {:.2}s, 增强 {:.2}s): {}",
                    ctx,
                    timing.acquisition_secs,
                    timing.enhancement_secs,
                    truncate_text(&text, 40)
                );
                unit.succeed(text, timing, model_used);
            }
            Err(e) => {
                warn!("{} ❌ 处理失败: {}", ctx, e);
                unit.fail(e.to_string(), timing);
            }
        }
        unit
    }

    async fn execute(
        &self,
        ctx: &UnitCtx,
        payload: &UnitPayload,
        channel: &ProgressChannel,
        timing: &mut TimingBreakdown,
    ) -> Result<(String, Option<String>), CollaboratorError> {
        // ========== 步骤 1: OCR 识别 ==========
        channel.publish(ProgressEvent::status_update(
            ProcessingStep::OcrProcessing,
            ctx.percent_complete,
            Some(ctx.unit_index),
            ctx.total_units,
        ));

        let stream_ocr = self.enhancer.is_none()
            && self.stream_text
            && self.recognizer.supports_streaming();

        let started = Instant::now();
        if stream_ocr {
            let text = match self
                .recognizer
                .recognize_stream(payload, &self.recognize_options)
                .await
            {
                Ok(stream) => forward_chunks(ctx, stream, channel).await,
                Err(e) => Err(e),
            };
            timing.acquisition_secs = started.elapsed().as_secs_f64();
            return text.map(|text| (text, None));
        }

        let recognition = self
            .recognizer
            .recognize(payload, &self.recognize_options)
            .await;
        timing.acquisition_secs = started.elapsed().as_secs_f64();
        let recognition = recognition?;

        debug!("{} OCR 文本长度: {}", ctx, recognition.text.chars().count());

        // ========== 步骤 2: LLM 增强 ==========
        let Some(enhancer) = self.enhancer.as_ref() else {
            return Ok((recognition.text, None));
        };

        channel.publish(ProgressEvent::status_update(
            ProcessingStep::LlmEnhancement,
            ctx.percent_complete,
            Some(ctx.unit_index),
            ctx.total_units,
        ));

        let image_base64 = match recognition.processed_image_base64 {
            Some(image) => image,
            None => {
                let bytes = tokio::fs::read(&payload.image_path).await.map_err(|source| {
                    CollaboratorError::ReadPayload {
                        path: payload.image_path.display().to_string(),
                        source,
                    }
                })?;
                BASE64.encode(bytes)
            }
        };

        let input = EnhanceInput {
            unit_index: ctx.unit_index,
            image_base64,
            ocr_text: recognition.text,
            prompt: self.prompt.clone(),
            model: self.model.clone(),
        };
        let model_used = enhancer.model_name(&input);

        let started = Instant::now();
        let text = if self.stream_text && enhancer.supports_streaming() {
            match enhancer.enhance_stream(&input).await {
                Ok(stream) => forward_chunks(ctx, stream, channel).await,
                Err(e) => Err(e),
            }
        } else {
            enhancer.enhance(&input).await
        };
        timing.enhancement_secs = started.elapsed().as_secs_f64();

        Ok((text?, Some(model_used)))
    }
}

/// 把文本流逐块转发为 `TextChunk`，返回完整文本
async fn forward_chunks(
    ctx: &UnitCtx,
    mut stream: TextStream,
    channel: &ProgressChannel,
) -> Result<String, CollaboratorError> {
    let mut accumulated = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        accumulated.push_str(&chunk);
        channel.publish(ProgressEvent::TextChunk {
            unit_index: ctx.unit_index,
            chunk,
            accumulated: accumulated.clone(),
        });
    }
    Ok(accumulated.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskId, UnitStatus};
    use crate::workflow::testing::{MockEnhancer, MockRecognizer};
    use std::time::Duration;

    fn options(mode: ProcessingMode, stream_text: bool) -> ProcessingOptions {
        ProcessingOptions {
            mode,
            stream_text,
            ..Default::default()
        }
    }

    async fn drain(channel: &ProgressChannel) -> Vec<ProgressEvent> {
        channel.publish(ProgressEvent::cancelled("drain"));
        let mut sub = channel.attach().unwrap();
        let mut events = Vec::new();
        while let Ok(event) = sub.next().await {
            if event.is_terminal() {
                break;
            }
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_basic_mode_skips_enhancer() {
        let enhancer = Arc::new(MockEnhancer::new());
        let flow = UnitFlow::new(
            Arc::new(MockRecognizer::new()),
            Some(enhancer.clone()),
            &options(ProcessingMode::Basic, false),
        );
        let channel = ProgressChannel::new(TaskId::new(), 16);
        let ctx = UnitCtx::new(channel.task_id(), 1, 1, 0.0);

        let unit = flow
            .run(&ctx, &UnitPayload::new(1, "/tmp/page-1.png"), &channel)
            .await;

        assert_eq!(unit.status, UnitStatus::Succeeded);
        assert_eq!(unit.extracted_text, "ocr 1");
        assert_eq!(unit.model_used, None);
        assert_eq!(enhancer.calls(), 0);
    }

    #[tokio::test]
    async fn test_recognizer_failure_recorded_on_unit() {
        let flow = UnitFlow::new(
            Arc::new(MockRecognizer::new().fail_on(2)),
            None,
            &options(ProcessingMode::Basic, false),
        );
        let channel = ProgressChannel::new(TaskId::new(), 16);
        let ctx = UnitCtx::new(channel.task_id(), 2, 3, 33.3);

        let unit = flow
            .run(&ctx, &UnitPayload::new(2, "/tmp/page-2.png"), &channel)
            .await;

        assert_eq!(unit.status, UnitStatus::Failed);
        assert!(unit.error_message.unwrap().contains("500"));
        assert!(unit.extracted_text.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timing_measured_per_collaborator() {
        let flow = UnitFlow::new(
            Arc::new(MockRecognizer::new().with_delay(Duration::from_millis(500))),
            Some(Arc::new(
                MockEnhancer::new().with_delay(1, Duration::from_secs(2)),
            )),
            &options(ProcessingMode::LlmEnhanced, false),
        );
        let channel = ProgressChannel::new(TaskId::new(), 16);
        let ctx = UnitCtx::new(channel.task_id(), 1, 1, 0.0);

        let unit = flow
            .run(&ctx, &UnitPayload::new(1, "/tmp/page-1.png"), &channel)
            .await;

        assert_eq!(unit.extracted_text, "enhanced 1");
        assert_eq!(unit.model_used.as_deref(), Some("mock-vision"));
        assert!((unit.timing.acquisition_secs - 0.5).abs() < 0.05);
        assert!((unit.timing.enhancement_secs - 2.0).abs() < 0.05);
    }

    #[tokio::test]
    async fn test_streaming_enhancer_forwards_chunks() {
        let flow = UnitFlow::new(
            Arc::new(MockRecognizer::new()),
            Some(Arc::new(
                MockEnhancer::new().with_chunks(&["สวัส", "ดี", " ครับ"]),
            )),
            &options(ProcessingMode::LlmEnhanced, true),
        );
        let channel = ProgressChannel::new(TaskId::new(), 32);
        let ctx = UnitCtx::new(channel.task_id(), 1, 1, 0.0);

        let unit = flow
            .run(&ctx, &UnitPayload::new(1, "/tmp/page-1.png"), &channel)
            .await;
        assert_eq!(unit.extracted_text, "สวัสดี ครับ");

        let chunks: Vec<_> = drain(&channel)
            .await
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::TextChunk {
                    unit_index,
                    chunk,
                    accumulated,
                } => Some((unit_index, chunk, accumulated)),
                _ => None,
            })
            .collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], (1, "ดี".to_string(), "สวัสดี".to_string()));
    }

    #[tokio::test]
    async fn test_streaming_recognizer_forwards_chunks_in_basic_mode() {
        let recognizer = Arc::new(MockRecognizer::new().with_chunks(&["第一", "行\n", "第二行 "]));
        let flow = UnitFlow::new(
            recognizer.clone(),
            Some(Arc::new(MockEnhancer::new())),
            &options(ProcessingMode::Basic, true),
        );
        let channel = ProgressChannel::new(TaskId::new(), 32);
        let ctx = UnitCtx::new(channel.task_id(), 2, 3, 33.3);

        let unit = flow
            .run(&ctx, &UnitPayload::new(2, "/tmp/page-2.png"), &channel)
            .await;

        assert_eq!(unit.status, UnitStatus::Succeeded);
        assert_eq!(unit.extracted_text, "第一行\n第二行");
        assert_eq!(unit.model_used, None);
        assert_eq!(recognizer.calls(), 1);

        let events = drain(&channel).await;
        assert!(matches!(
            events[0],
            ProgressEvent::StatusUpdate {
                step: ProcessingStep::OcrProcessing,
                unit_index: Some(2),
                ..
            }
        ));
        let chunks: Vec<_> = events[1..]
            .iter()
            .map(|event| match event {
                ProgressEvent::TextChunk {
                    unit_index,
                    chunk,
                    accumulated,
                } => (*unit_index, chunk.as_str(), accumulated.as_str()),
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_eq!(
            chunks,
            vec![
                (2, "第一", "第一"),
                (2, "行\n", "第一行\n"),
                (2, "第二行 ", "第一行\n第二行 "),
            ]
        );
    }

    #[tokio::test]
    async fn test_streaming_recognizer_ignored_without_stream_text() {
        let flow = UnitFlow::new(
            Arc::new(MockRecognizer::new().with_chunks(&["a", "b"])),
            None,
            &options(ProcessingMode::Basic, false),
        );
        let channel = ProgressChannel::new(TaskId::new(), 32);
        let ctx = UnitCtx::new(channel.task_id(), 1, 1, 0.0);

        let unit = flow
            .run(&ctx, &UnitPayload::new(1, "/tmp/page-1.png"), &channel)
            .await;

        assert_eq!(unit.extracted_text, "ocr 1");
        assert!(!drain(&channel)
            .await
            .iter()
            .any(|e| matches!(e, ProgressEvent::TextChunk { .. })));
    }
}
