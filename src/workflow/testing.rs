//! 单元测试用的协作服务替身

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::CollaboratorError;
use crate::models::UnitPayload;
use crate::services::{EnhanceInput, Enhancer, Recognition, RecognizeOptions, Recognizer, TextStream};

/// 返回 `ocr {index}`，可按单元注入失败，可流式输出固定文本块
#[derive(Default)]
pub struct MockRecognizer {
    delay: Duration,
    fail_on: HashSet<usize>,
    chunks: Option<Vec<String>>,
    calls: AtomicUsize,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_on(mut self, index: usize) -> Self {
        self.fail_on.insert(index);
        self
    }

    pub fn with_chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = Some(chunks.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(
        &self,
        payload: &UnitPayload,
        _options: &RecognizeOptions,
    ) -> Result<Recognition, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail_on.contains(&payload.index) {
            return Err(CollaboratorError::BadResponse {
                service: "OCR",
                status: 500,
            });
        }
        Ok(Recognition {
            text: format!("ocr {}", payload.index),
            processed_image_base64: Some("aW1hZ2U=".to_string()),
        })
    }

    fn supports_streaming(&self) -> bool {
        self.chunks.is_some()
    }

    async fn recognize_stream(
        &self,
        _payload: &UnitPayload,
        _options: &RecognizeOptions,
    ) -> Result<TextStream, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let chunks = self
            .chunks
            .clone()
            .ok_or(CollaboratorError::StreamingUnsupported)?;
        Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
    }
}

/// 返回 `enhanced {index}`，可按单元设置耗时，可流式输出固定文本块
#[derive(Default)]
pub struct MockEnhancer {
    delays: HashMap<usize, Duration>,
    chunks: Option<Vec<String>>,
    calls: AtomicUsize,
}

impl MockEnhancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    pub fn with_chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = Some(chunks.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Enhancer for MockEnhancer {
    async fn enhance(&self, input: &EnhanceInput) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .delays
            .get(&input.unit_index)
            .copied()
            .unwrap_or_default();
        tokio::time::sleep(delay).await;
        Ok(format!("enhanced {}", input.unit_index))
    }

    fn model_name(&self, input: &EnhanceInput) -> String {
        input
            .model
            .clone()
            .unwrap_or_else(|| "mock-vision".to_string())
    }

    fn supports_streaming(&self) -> bool {
        self.chunks.is_some()
    }

    async fn enhance_stream(&self, _input: &EnhanceInput) -> Result<TextStream, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self
            .chunks
            .clone()
            .ok_or(CollaboratorError::StreamingUnsupported)?;
        Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
    }
}
