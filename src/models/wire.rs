//! SSE 在线协议
//!
//! 每个事件序列化为一行 `data: <json>\n\n`。字段使用 camelCase，
//! 状态字符串为 `processing` / `page_completed` / `completed` / `failed` / `cancelled`。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::event::{ProcessingStep, ProgressEvent, UnitProgress};
use crate::models::task::TaskId;
use crate::models::unit::{TimingSummary, WorkUnit};

pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_PAGE_COMPLETED: &str = "page_completed";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_CANCELLED: &str = "cancelled";

/// 一帧 SSE 数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireFrame {
    Heartbeat(HeartbeatFrame),
    Event(Box<EventFrame>),
}

impl WireFrame {
    pub fn heartbeat() -> Self {
        WireFrame::Heartbeat(HeartbeatFrame {
            heartbeat: true,
            timestamp: Utc::now(),
        })
    }

    pub fn event(task_id: &TaskId, event: &ProgressEvent) -> Self {
        WireFrame::Event(Box::new(EventFrame::encode(task_id, event)))
    }

    /// 编码为 `data: {json}\n\n`
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }

    /// 解析一行 `data: {json}`（末尾空行可有可无）
    pub fn from_sse(frame: &str) -> Result<Self, WireDecodeError> {
        let payload = frame
            .trim_end()
            .strip_prefix("data:")
            .ok_or(WireDecodeError::MissingDataPrefix)?
            .trim_start();
        Ok(serde_json::from_str(payload)?)
    }
}

/// 心跳帧，不是真正的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatFrame {
    pub heartbeat: bool,
    pub timestamp: DateTime<Utc>,
}

/// 事件帧
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    pub task_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,

    // StatusUpdate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<ProcessingStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_unit_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_units: Option<usize>,

    // TextChunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulated_text: Option<String>,

    // UnitCompleted / Completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_unit_result: Option<WorkUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_results: Option<Vec<WorkUnit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_units: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_units: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingSummary>,

    // Failed / Cancelled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

/// 解码失败
#[derive(Debug, Error)]
pub enum WireDecodeError {
    #[error("缺少 'data:' 前缀")]
    MissingDataPrefix,
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("未知状态: {0}")]
    UnknownStatus(String),
    #[error("状态 {status} 缺少字段 {field}")]
    MissingField {
        status: String,
        field: &'static str,
    },
    #[error("心跳帧不是进度事件")]
    Heartbeat,
}

impl EventFrame {
    pub fn encode(task_id: &TaskId, event: &ProgressEvent) -> Self {
        let base = EventFrame {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            ..Default::default()
        };

        match event {
            ProgressEvent::StatusUpdate {
                step,
                percent_complete,
                unit_index,
                total_units,
            } => EventFrame {
                status: STATUS_PROCESSING.to_string(),
                current_step: Some(*step),
                progress_percentage: Some(*percent_complete),
                current_unit_index: *unit_index,
                total_units: Some(*total_units),
                ..base
            },
            ProgressEvent::TextChunk {
                unit_index,
                chunk,
                accumulated,
            } => EventFrame {
                status: STATUS_PROCESSING.to_string(),
                unit_index: Some(*unit_index),
                text_chunk: Some(chunk.clone()),
                accumulated_text: Some(accumulated.clone()),
                ..base
            },
            ProgressEvent::UnitCompleted(progress) => {
                Self::with_progress(base, STATUS_PAGE_COMPLETED, progress)
            }
            ProgressEvent::Completed(progress) => {
                Self::with_progress(base, STATUS_COMPLETED, progress)
            }
            ProgressEvent::Failed { error_message } => EventFrame {
                status: STATUS_FAILED.to_string(),
                error_message: Some(error_message.clone()),
                ..base
            },
            ProgressEvent::Cancelled { reason } => EventFrame {
                status: STATUS_CANCELLED.to_string(),
                cancellation_reason: Some(reason.clone()),
                ..base
            },
        }
    }

    fn with_progress(base: EventFrame, status: &str, progress: &UnitProgress) -> Self {
        EventFrame {
            status: status.to_string(),
            latest_unit_result: progress.latest.clone(),
            cumulative_results: Some(progress.cumulative.clone()),
            processed_units: Some(progress.processed_units),
            failed_units: Some(progress.failed_units),
            total_units: Some(progress.total_units),
            progress_percentage: Some(progress.percent_complete),
            estimated_time_remaining: progress.estimated_time_remaining,
            timing: progress.timing,
            ..base
        }
    }

    /// 还原为进度事件
    pub fn into_event(self) -> Result<ProgressEvent, WireDecodeError> {
        let status = self.status.clone();
        let missing = |field: &'static str| WireDecodeError::MissingField {
            status: status.clone(),
            field,
        };

        match status.as_str() {
            STATUS_PROCESSING if self.text_chunk.is_some() => Ok(ProgressEvent::TextChunk {
                unit_index: self.unit_index.ok_or_else(|| missing("unitIndex"))?,
                chunk: self.text_chunk.unwrap_or_default(),
                accumulated: self
                    .accumulated_text
                    .ok_or_else(|| missing("accumulatedText"))?,
            }),
            STATUS_PROCESSING => Ok(ProgressEvent::StatusUpdate {
                step: self.current_step.ok_or_else(|| missing("currentStep"))?,
                percent_complete: self
                    .progress_percentage
                    .ok_or_else(|| missing("progressPercentage"))?,
                unit_index: self.current_unit_index,
                total_units: self.total_units.ok_or_else(|| missing("totalUnits"))?,
            }),
            STATUS_PAGE_COMPLETED => Ok(ProgressEvent::UnitCompleted(
                self.progress(&missing)?,
            )),
            STATUS_COMPLETED => Ok(ProgressEvent::Completed(self.progress(&missing)?)),
            STATUS_FAILED => Ok(ProgressEvent::Failed {
                error_message: self.error_message.ok_or_else(|| missing("errorMessage"))?,
            }),
            STATUS_CANCELLED => Ok(ProgressEvent::Cancelled {
                reason: self
                    .cancellation_reason
                    .ok_or_else(|| missing("cancellationReason"))?,
            }),
            other => Err(WireDecodeError::UnknownStatus(other.to_string())),
        }
    }

    fn progress(
        self,
        missing: &dyn Fn(&'static str) -> WireDecodeError,
    ) -> Result<UnitProgress, WireDecodeError> {
        Ok(UnitProgress {
            latest: self.latest_unit_result,
            cumulative: self
                .cumulative_results
                .ok_or_else(|| missing("cumulativeResults"))?,
            processed_units: self
                .processed_units
                .ok_or_else(|| missing("processedUnits"))?,
            failed_units: self.failed_units.ok_or_else(|| missing("failedUnits"))?,
            total_units: self.total_units.ok_or_else(|| missing("totalUnits"))?,
            percent_complete: self
                .progress_percentage
                .ok_or_else(|| missing("progressPercentage"))?,
            estimated_time_remaining: self.estimated_time_remaining,
            timing: self.timing,
        })
    }
}

impl TryFrom<WireFrame> for ProgressEvent {
    type Error = WireDecodeError;

    fn try_from(frame: WireFrame) -> Result<Self, Self::Error> {
        match frame {
            WireFrame::Heartbeat(_) => Err(WireDecodeError::Heartbeat),
            WireFrame::Event(event) => event.into_event(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::unit::TimingBreakdown;

    fn round_trip(event: ProgressEvent) -> ProgressEvent {
        let task_id = TaskId::new();
        let sse = WireFrame::event(&task_id, &event).to_sse().unwrap();
        assert!(sse.starts_with("data: "));
        assert!(sse.ends_with("\n\n"));

        let frame = WireFrame::from_sse(&sse).unwrap();
        match &frame {
            WireFrame::Event(e) => assert_eq!(e.task_id, task_id.to_string()),
            WireFrame::Heartbeat(_) => panic!("事件被解析成了心跳"),
        }
        ProgressEvent::try_from(frame).unwrap()
    }

    #[test]
    fn test_every_variant_round_trips() {
        let unit_ok = WorkUnit::succeeded(
            1,
            "บรรทัดแรก".to_string(),
            TimingBreakdown {
                acquisition_secs: 0.5,
                enhancement_secs: 1.25,
            },
            Some("vision-model".to_string()),
        );
        let unit_failed = WorkUnit::failed(
            2,
            "OCR 返回内容为空".to_string(),
            TimingBreakdown::default(),
        );
        let progress = UnitProgress {
            latest: Some(unit_failed.clone()),
            cumulative: vec![unit_ok, unit_failed],
            processed_units: 1,
            failed_units: 1,
            total_units: 4,
            percent_complete: 50.0,
            estimated_time_remaining: Some(3.5),
            timing: None,
        };

        let events = vec![
            ProgressEvent::status_update(ProcessingStep::OcrProcessing, 20.0, Some(2), 4),
            ProgressEvent::status_update(ProcessingStep::Upload, 5.0, None, 1),
            ProgressEvent::TextChunk {
                unit_index: 1,
                chunk: "ab".to_string(),
                accumulated: "xxab".to_string(),
            },
            ProgressEvent::UnitCompleted(progress.clone()),
            ProgressEvent::Completed(UnitProgress {
                latest: None,
                estimated_time_remaining: None,
                timing: Some(TimingSummary {
                    total_acquisition_secs: 1.5,
                    total_enhancement_secs: 3.0,
                    wall_clock_secs: 4.5,
                }),
                ..progress
            }),
            ProgressEvent::failed("渲染失败"),
            ProgressEvent::cancelled("User requested cancellation"),
        ];

        for event in events {
            assert_eq!(round_trip(event.clone()), event);
        }
    }

    #[test]
    fn test_status_strings_on_the_wire() {
        let task_id = TaskId::new();
        let frame = EventFrame::encode(&task_id, &ProgressEvent::UnitCompleted(UnitProgress::default()));
        assert_eq!(frame.status, "page_completed");

        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("cumulativeResults").is_some());
        assert!(json.get("textChunk").is_none());
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn test_heartbeat_frame_shape() {
        let sse = WireFrame::heartbeat().to_sse().unwrap();
        let json: serde_json::Value =
            serde_json::from_str(sse.trim_start_matches("data: ").trim_end()).unwrap();

        assert_eq!(json["heartbeat"], serde_json::Value::Bool(true));
        assert!(json.get("taskId").is_none());
        assert!(matches!(
            WireFrame::from_sse(&sse).unwrap(),
            WireFrame::Heartbeat(_)
        ));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let frame = EventFrame {
            task_id: "t".to_string(),
            status: "exploded".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            frame.into_event(),
            Err(WireDecodeError::UnknownStatus(_))
        ));
    }
}
