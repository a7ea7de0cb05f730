//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度、分批并发与收尾，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `task_processor` - 任务处理器
//! - 准入控制（Semaphore）
//! - 创建任务与进度通道，登记到注册表
//! - 派生后台任务：PDF 渲染 → 分批处理 → 收尾
//!
//! ### `batch_processor` - 分批处理器
//! - 按 `batch_size` 分批，批内并发
//! - 发布累计进度，汇总耗时
//!
//! ### `cancellation` / `cleanup`
//! - 取消与完成的竞争只有一个赢家
//! - 两阶段清理：立即移出 Active，宽限期后移出 Known
//!
//! ## 层次关系
//!
//! ```text
//! task_processor (处理一个任务)
//!     ↓
//! batch_processor (处理 Vec<UnitPayload>)
//!     ↓
//! workflow::UnitFlow (处理单个单元)
//!     ↓
//! services (能力层：recognize / enhance / render)
//!     ↓
//! infrastructure (基础设施：ProgressChannel / TaskRegistry)
//! ```

pub mod batch_processor;
pub mod cancellation;
pub mod cleanup;
pub mod task_processor;

// 重新导出主要类型
pub use batch_processor::{BatchOutcome, PageBatchCoordinator};
pub use cancellation::{CancellationCoordinator, DEFAULT_CANCEL_REASON};
pub use cleanup::GracePeriodCleanup;
pub use task_processor::{Collaborators, TaskProcessor};
