//! 数据模型
//!
//! - `task` - 任务条目与状态格
//! - `unit` - 工作单元与耗时
//! - `event` - 进度事件
//! - `wire` - SSE 在线协议
//! - `request` - 提交 / 取消请求与响应

pub mod event;
pub mod request;
pub mod task;
pub mod unit;
pub mod wire;

pub use event::{ProcessingStep, ProgressEvent, UnitProgress};
pub use request::{
    CancelOutcome, CancelRequest, CancelResponse, FileMetadata, FileType, ProcessingMode,
    ProcessingOptions, SubmitRequest, SubmitResponse,
};
pub use task::{TaskEntry, TaskId, TaskKind, TaskSnapshot, TaskStatus};
pub use unit::{TimingBreakdown, TimingSummary, UnitPayload, UnitStatus, WorkUnit};
pub use wire::{EventFrame, WireDecodeError, WireFrame};
