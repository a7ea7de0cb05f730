//! 基础设施层
//!
//! 持有跨任务共享的状态，只暴露能力：
//! - `ProgressChannel` - 单任务进度事件队列
//! - `TaskRegistry` - 进程内任务注册表（Known / Active 两个视图）

pub mod progress_channel;
pub mod task_registry;

pub use progress_channel::{ProgressChannel, ProgressSubscriber, PublishOutcome};
pub use task_registry::TaskRegistry;
