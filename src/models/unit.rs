//! 工作单元（一页，或单张图片）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 单元状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// 单元耗时拆分（秒）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    /// OCR 识别耗时
    pub acquisition_secs: f64,
    /// LLM 增强耗时
    pub enhancement_secs: f64,
}

/// 单个单元的处理结果
///
/// 状态只能 `Pending → Running → {Succeeded, Failed}`，终态之后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnit {
    /// 从 1 开始，决定输出顺序
    pub index: usize,
    pub status: UnitStatus,
    pub extracted_text: String,
    pub timing: TimingBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkUnit {
    pub fn pending(index: usize) -> Self {
        Self {
            index,
            status: UnitStatus::Pending,
            extracted_text: String::new(),
            timing: TimingBreakdown::default(),
            error_message: None,
            model_used: None,
            completed_at: None,
        }
    }

    /// 开始处理；只有 `Pending` 单元可以开始
    pub fn start(&mut self) -> bool {
        if self.status != UnitStatus::Pending {
            return false;
        }
        self.status = UnitStatus::Running;
        true
    }

    /// 记录成功结果；已是终态时忽略
    pub fn succeed(
        &mut self,
        text: String,
        timing: TimingBreakdown,
        model_used: Option<String>,
    ) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = UnitStatus::Succeeded;
        self.extracted_text = text;
        self.timing = timing;
        self.model_used = model_used;
        self.completed_at = Some(Utc::now());
        true
    }

    /// 记录失败；已是终态时忽略
    pub fn fail(&mut self, error_message: String, timing: TimingBreakdown) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = UnitStatus::Failed;
        self.timing = timing;
        self.error_message = Some(error_message);
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn succeeded(
        index: usize,
        text: String,
        timing: TimingBreakdown,
        model_used: Option<String>,
    ) -> Self {
        let mut unit = Self::pending(index);
        unit.succeed(text, timing, model_used);
        unit
    }

    pub fn failed(index: usize, error_message: String, timing: TimingBreakdown) -> Self {
        let mut unit = Self::pending(index);
        unit.fail(error_message, timing);
        unit
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, UnitStatus::Succeeded | UnitStatus::Failed)
    }
}

/// 任务级耗时汇总（秒）
///
/// 识别耗时按单元求和；增强耗时每批取最大值再跨批求和。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSummary {
    pub total_acquisition_secs: f64,
    pub total_enhancement_secs: f64,
    pub wall_clock_secs: f64,
}

/// 交给协作服务的单元输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPayload {
    pub index: usize,
    pub image_path: PathBuf,
}

impl UnitPayload {
    pub fn new(index: usize, image_path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            image_path: image_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_lifecycle() {
        let mut unit = WorkUnit::pending(4);
        assert_eq!(unit.status, UnitStatus::Pending);
        assert!(!unit.is_finished());

        assert!(unit.start());
        assert_eq!(unit.status, UnitStatus::Running);
        assert!(!unit.start());

        let timing = TimingBreakdown {
            acquisition_secs: 0.4,
            enhancement_secs: 0.0,
        };
        assert!(unit.succeed("สวัสดี".to_string(), timing, None));
        assert!(unit.is_finished());
        assert!(unit.completed_at.is_some());
    }

    #[test]
    fn test_finished_unit_is_immutable() {
        let mut unit = WorkUnit::failed(2, "OCR 超时".to_string(), TimingBreakdown::default());

        assert!(!unit.succeed("late".to_string(), TimingBreakdown::default(), None));
        assert!(!unit.start());
        assert_eq!(unit.status, UnitStatus::Failed);
        assert!(unit.extracted_text.is_empty());
        assert_eq!(unit.error_message.as_deref(), Some("OCR 超时"));
    }
}
