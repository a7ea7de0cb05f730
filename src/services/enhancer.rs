//! LLM 增强能力 - 业务能力层

use async_trait::async_trait;

use crate::error::CollaboratorError;
use crate::services::recognizer::TextStream;

/// 增强输入
#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceInput {
    pub unit_index: usize,
    /// 已经编码好的图片（base64，不含 data URL 前缀）
    pub image_base64: String,
    /// OCR 阶段识别出的文本
    pub ocr_text: String,
    pub prompt: Option<String>,
    pub model: Option<String>,
}

/// LLM 增强协作服务
#[async_trait]
pub trait Enhancer: Send + Sync {
    /// 返回最终文本
    async fn enhance(&self, input: &EnhanceInput) -> Result<String, CollaboratorError>;

    /// 实际使用的模型名（记录到单元结果）
    fn model_name(&self, input: &EnhanceInput) -> String;

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn enhance_stream(&self, _input: &EnhanceInput) -> Result<TextStream, CollaboratorError> {
        Err(CollaboratorError::StreamingUnsupported)
    }
}
