//! # OCR Stream
//!
//! 流式 OCR 任务服务：接收图片或 PDF，交给外部 OCR / LLM 服务识别，
//! 并通过 SSE 逐页推送进度，直到完成或被取消。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有跨任务共享的状态，只暴露能力
//! - `ProgressChannel` - 单任务进度事件队列（单消费者、终止事件保证送达）
//! - `TaskRegistry` - Known / Active 两个视图
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个单元
//! - `Recognizer` / `Enhancer` / `PageRenderer`
//! - 具体实现位于 `clients/`（reqwest、async-openai、pdftoppm）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个单元"的完整处理流程
//! - `UnitCtx` - 上下文封装（task_id + unit_index）
//! - `UnitFlow` - 流程编排（recognize → enhance → 文本流转发）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/task_processor` - 准入、登记、派生后台任务
//! - `orchestrator/batch_processor` - 分批并发、累计进度
//! - `orchestrator/cancellation` / `cleanup` - 取消与两阶段清理
//!
//! ### ⑤ 接口层（API）
//! - `api/` - axum 路由、SSE 推送、上传处理

pub mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ProgressChannel, ProgressSubscriber, TaskRegistry};
pub use models::{ProgressEvent, TaskId, WireFrame};
pub use orchestrator::{Collaborators, TaskProcessor};
pub use workflow::{UnitCtx, UnitFlow};
