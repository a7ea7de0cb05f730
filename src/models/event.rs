//! 进度事件

use serde::{Deserialize, Serialize};

use crate::models::task::TaskStatus;
use crate::models::unit::{TimingSummary, WorkUnit};

/// 处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    Upload,
    Validation,
    ImageExtraction,
    OcrProcessing,
    LlmEnhancement,
    Completed,
    Failed,
    Cancelled,
}

/// 单元完成 / 任务完成时携带的累计进度
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnitProgress {
    pub latest: Option<WorkUnit>,
    /// 按 index 升序
    pub cumulative: Vec<WorkUnit>,
    pub processed_units: usize,
    pub failed_units: usize,
    pub total_units: usize,
    pub percent_complete: f64,
    pub estimated_time_remaining: Option<f64>,
    pub timing: Option<TimingSummary>,
}

/// 进度事件（封闭枚举，在线协议边界穷举匹配）
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StatusUpdate {
        step: ProcessingStep,
        percent_complete: f64,
        unit_index: Option<usize>,
        total_units: usize,
    },
    TextChunk {
        unit_index: usize,
        chunk: String,
        accumulated: String,
    },
    UnitCompleted(UnitProgress),
    Completed(UnitProgress),
    Failed {
        error_message: String,
    },
    Cancelled {
        reason: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed(_) | ProgressEvent::Failed { .. } | ProgressEvent::Cancelled { .. }
        )
    }

    /// 终止事件对应的任务状态
    pub fn terminal_status(&self) -> Option<TaskStatus> {
        match self {
            ProgressEvent::Completed(_) => Some(TaskStatus::Completed),
            ProgressEvent::Failed { .. } => Some(TaskStatus::Failed),
            ProgressEvent::Cancelled { .. } => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn status_update(
        step: ProcessingStep,
        percent_complete: f64,
        unit_index: Option<usize>,
        total_units: usize,
    ) -> Self {
        ProgressEvent::StatusUpdate {
            step,
            percent_complete,
            unit_index,
            total_units,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        ProgressEvent::Failed {
            error_message: error_message.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        ProgressEvent::Cancelled {
            reason: reason.into(),
        }
    }
}
