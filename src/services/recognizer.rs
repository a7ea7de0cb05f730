//! 文字识别能力 - 业务能力层
//!
//! 只描述"识别一个单元"的能力，不关心任务、批次与进度。

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::CollaboratorError;
use crate::models::UnitPayload;

/// 逐块输出的文本流
pub type TextStream = BoxStream<'static, Result<String, CollaboratorError>>;

/// 识别结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognition {
    /// 识别出的文本（可能为空，由增强阶段补全）
    pub text: String,
    /// 预处理后的图片（base64），供增强阶段使用
    pub processed_image_base64: Option<String>,
}

/// 识别参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognizeOptions {
    pub threshold: u32,
    pub contrast_level: f32,
}

impl Default for RecognizeOptions {
    fn default() -> Self {
        Self {
            threshold: 500,
            contrast_level: 1.3,
        }
    }
}

/// OCR 协作服务
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// 识别单个单元
    async fn recognize(
        &self,
        payload: &UnitPayload,
        options: &RecognizeOptions,
    ) -> Result<Recognition, CollaboratorError>;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// 流式识别，每次产出一段新文本
    async fn recognize_stream(
        &self,
        _payload: &UnitPayload,
        _options: &RecognizeOptions,
    ) -> Result<TextStream, CollaboratorError> {
        Err(CollaboratorError::StreamingUnsupported)
    }
}
