//! HTTP 处理函数

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::api::sse::StreamPublisher;
use crate::api::upload::{prepare_submission, read_multipart};
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    CancelOutcome, CancelRequest, CancelResponse, SubmitResponse, TaskId, TaskSnapshot,
};
use crate::orchestrator::DEFAULT_CANCEL_REASON;

/// 无法解析的任务 ID 与不存在的任务同样处理
fn parse_task_id(raw: &str) -> AppResult<TaskId> {
    raw.parse().map_err(|_| AppError::task_not_found(raw))
}

/// POST /v1/ocr/process-stream
pub async fn submit(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<SubmitResponse>> {
    let upload = read_multipart(multipart).await?;
    let request = prepare_submission(upload, state.processor.config()).await?;
    let response = state.processor.submit(request).await?;
    Ok(Json(response))
}

/// GET /v1/ocr/stream/:task_id
pub async fn stream(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Response> {
    let id = parse_task_id(&task_id)?;
    let subscriber = state.processor.subscribe(&id).await?;
    info!("[任务 {}] 📡 客户端已订阅进度", id);

    let publisher = StreamPublisher::new(state.processor.config().heartbeat_interval());
    let mut response = Body::from_stream(publisher.frames(subscriber)).into_response();

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}

/// POST /v1/ocr/tasks/:task_id/cancel
///
/// 请求体可选：`{"reason": "..."}`
pub async fn cancel(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<CancelResponse>> {
    let id = parse_task_id(&task_id)?;
    let request: CancelRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CancelRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    let outcome = state.processor.cancel(&id, request.reason.clone()).await?;
    let reason = match outcome {
        CancelOutcome::Cancelled => state
            .processor
            .status(&id)
            .await
            .ok()
            .and_then(|snapshot| snapshot.cancellation_reason),
        CancelOutcome::AlreadyCompleted => request.reason,
    }
    .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());

    let message = match outcome {
        CancelOutcome::Cancelled => "任务已取消",
        CancelOutcome::AlreadyCompleted => "任务已经结束，无需取消",
    };

    Ok(Json(CancelResponse {
        task_id: id.to_string(),
        status: outcome.as_str().to_string(),
        message: message.to_string(),
        cancelled_at: Utc::now(),
        cancellation_reason: reason,
    }))
}

/// GET /v1/ocr/tasks/:task_id/status
pub async fn status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<TaskSnapshot>> {
    let id = parse_task_id(&task_id)?;
    Ok(Json(state.processor.status(&id).await?))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "activeTasks": state.processor.active_count().await,
        "knownTasks": state.processor.known_count().await,
    }))
}
