//! 提交 / 取消请求与响应模型

use crate::error::{AppError, AppResult, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 支持的文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Pdf,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Pdf => "pdf",
        }
    }
}

/// 处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// 只做 OCR
    #[default]
    Basic,
    /// OCR + LLM 增强
    LlmEnhanced,
}

/// 上传文件元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub original_filename: String,
    pub file_size_bytes: usize,
    pub mime_type: String,
    pub detected_file_type: FileType,
}

/// 处理参数（multipart 中的 `request` 字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingOptions {
    pub mode: ProcessingMode,
    /// 未给出时使用服务端配置的默认值
    pub threshold: Option<u32>,
    pub contrast_level: Option<f32>,
    /// 仅 PDF 有效
    pub dpi: Option<u32>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    /// 是否逐字输出识别文本
    pub stream_text: bool,
    /// 仅处理指定页（1 起始）
    pub pages: Option<Vec<usize>>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Basic,
            threshold: None,
            contrast_level: None,
            dpi: None,
            prompt: None,
            model: None,
            stream_text: false,
            pages: None,
        }
    }
}

impl ProcessingOptions {
    /// 补全请求中缺省的识别参数，显式给出的值保持不变
    pub fn fill_recognition_defaults(&mut self, threshold: u32, contrast_level: f32) {
        self.threshold.get_or_insert(threshold);
        self.contrast_level.get_or_insert(contrast_level);
    }

    /// 校验参数范围，并把页码排序
    pub fn validate(&mut self) -> AppResult<()> {
        if let Some(threshold) = self.threshold.filter(|t| *t > 1024) {
            return Err(AppError::invalid_request(format!(
                "threshold 必须在 0-1024 之间，当前为 {}",
                threshold
            )));
        }
        if let Some(contrast) = self.contrast_level.filter(|c| !(0.1..=5.0).contains(c)) {
            return Err(AppError::invalid_request(format!(
                "contrastLevel 必须在 0.1-5.0 之间，当前为 {}",
                contrast
            )));
        }
        if let Some(dpi) = self.dpi {
            if !(150..=600).contains(&dpi) {
                return Err(AppError::invalid_request(format!(
                    "dpi 必须在 150-600 之间，当前为 {}",
                    dpi
                )));
            }
        }
        if let Some(pages) = self.pages.as_mut() {
            normalize_page_selection(pages)?;
        }
        Ok(())
    }
}

/// 页码选择：非空、从 1 开始、无重复，结果升序
pub fn normalize_page_selection(pages: &mut Vec<usize>) -> AppResult<()> {
    if pages.is_empty() {
        return Err(TaskError::InvalidPageSelection {
            reason: "页码列表不能为空".to_string(),
        }
        .into());
    }
    if pages.contains(&0) {
        return Err(TaskError::InvalidPageSelection {
            reason: "页码从 1 开始".to_string(),
        }
        .into());
    }
    pages.sort_unstable();
    let before = pages.len();
    pages.dedup();
    if pages.len() != before {
        return Err(TaskError::InvalidPageSelection {
            reason: "页码不能重复".to_string(),
        }
        .into());
    }
    Ok(())
}

/// 已落盘的提交请求
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub file_path: PathBuf,
    pub metadata: FileMetadata,
    pub options: ProcessingOptions,
}

/// 提交响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub task_id: String,
    pub file_type: FileType,
    pub processing_mode: ProcessingMode,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub estimated_duration: f64,
    pub file_metadata: FileMetadata,
}

/// 取消请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// 取消结果（`AlreadyCompleted` 不是错误）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCompleted,
}

impl CancelOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelOutcome::Cancelled => "cancelled",
            CancelOutcome::AlreadyCompleted => "already_completed",
        }
    }
}

/// 取消响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub task_id: String,
    pub status: String,
    pub message: String,
    pub cancelled_at: DateTime<Utc>,
    pub cancellation_reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults_from_partial_json() {
        let mut options: ProcessingOptions =
            serde_json::from_str(r#"{"mode":"llm_enhanced","pages":[5,1,3]}"#).unwrap();
        options.validate().unwrap();

        assert_eq!(options.mode, ProcessingMode::LlmEnhanced);
        assert_eq!(options.threshold, None);
        assert_eq!(options.pages, Some(vec![1, 3, 5]));
    }

    #[test]
    fn test_recognition_defaults_keep_explicit_values() {
        let mut options: ProcessingOptions =
            serde_json::from_str(r#"{"contrastLevel":2.0}"#).unwrap();
        options.fill_recognition_defaults(700, 1.3);

        assert_eq!(options.threshold, Some(700));
        assert_eq!(options.contrast_level, Some(2.0));
    }

    #[test]
    fn test_page_selection_rejects_duplicates_and_zero() {
        assert!(normalize_page_selection(&mut vec![1, 2, 2]).is_err());
        assert!(normalize_page_selection(&mut vec![0, 1]).is_err());
        assert!(normalize_page_selection(&mut vec![]).is_err());
    }

    #[test]
    fn test_options_range_checks() {
        let mut options = ProcessingOptions {
            contrast_level: Some(9.0),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let mut options = ProcessingOptions {
            dpi: Some(100),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
