//! API 模块
//!
//! 负责所有与客户端的 HTTP 交互：
//! - `POST /v1/ocr/process-stream` 提交任务
//! - `GET  /v1/ocr/stream/:task_id` 订阅进度（SSE）
//! - `POST /v1/ocr/tasks/:task_id/cancel` 取消任务
//! - `GET  /v1/ocr/tasks/:task_id/status` 查询状态
//! - `GET  /health` 健康检查

pub mod handlers;
pub mod sse;
pub mod upload;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, warn};

use crate::error::{AppError, ChannelError, TaskError, UploadError};
use crate::orchestrator::TaskProcessor;

pub use sse::StreamPublisher;

/// 处理函数共享状态
#[derive(Clone)]
pub struct AppState {
    pub processor: TaskProcessor,
}

/// multipart 其他字段预留的额外大小
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// 构建路由
pub fn router(processor: TaskProcessor) -> Router {
    let body_limit = processor
        .config()
        .max_pdf_size
        .max(processor.config().max_image_size)
        + MULTIPART_OVERHEAD;

    Router::new()
        .route("/v1/ocr/process-stream", post(handlers::submit))
        .route("/v1/ocr/stream/:task_id", get(handlers::stream))
        .route("/v1/ocr/tasks/:task_id/cancel", post(handlers::cancel))
        .route("/v1/ocr/tasks/:task_id/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(AppState { processor })
}

impl AppError {
    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Task(TaskError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Task(TaskError::TooManyTasks { .. }) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Task(TaskError::InvalidPageSelection { .. }) => StatusCode::BAD_REQUEST,
            AppError::Task(TaskError::Aborted { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Channel(ChannelError::AlreadyAttached { .. }) => StatusCode::CONFLICT,
            AppError::Channel(ChannelError::ChannelClosed { .. }) => StatusCode::GONE,
            AppError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Upload(UploadError::UnsupportedType { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            AppError::Upload(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Collaborator(_) | AppError::Config(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("❌ 请求处理失败: {}", self);
        } else {
            warn!("⚠️ 请求被拒绝 ({}): {}", status.as_u16(), self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
