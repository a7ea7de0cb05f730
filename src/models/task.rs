//! 任务模型
//!
//! 状态存放在 `AtomicU8` 中，按单调格推进：
//! `Pending < Processing ≤ PageCompleted < {Completed, Failed, Cancelled}`。
//! 进入终止状态后所有写入都是空操作，因此完成与取消的竞争只会有一个赢家。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::request::{FileMetadata, FileType, ProcessingMode};

/// 任务 ID（UUID v4）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// 任务状态
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending = 0,
    Processing = 1,
    PageCompleted = 2,
    Completed = 3,
    Failed = 4,
    Cancelled = 5,
}

impl TaskStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Processing,
            2 => TaskStatus::PageCompleted,
            3 => TaskStatus::Completed,
            4 => TaskStatus::Failed,
            _ => TaskStatus::Cancelled,
        }
    }

    /// 在状态格中的层级
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing | TaskStatus::PageCompleted => 1,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::PageCompleted => "page_completed",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// 任务形态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// 单张图片
    SingleUnit,
    /// 多页 PDF；`requested_pages` 为空表示全部页面，实际页码在渲染后确定
    MultiUnit { requested_pages: Option<Vec<usize>> },
}

impl TaskKind {
    pub fn for_file(file_type: FileType, pages: Option<Vec<usize>>) -> Self {
        match file_type {
            FileType::Image => TaskKind::SingleUnit,
            FileType::Pdf => TaskKind::MultiUnit {
                requested_pages: pages,
            },
        }
    }
}

/// 任务条目
///
/// 只有协调器写非状态字段；取消方只设置取消标志、推进状态、记录原因。
#[derive(Debug)]
pub struct TaskEntry {
    pub id: TaskId,
    pub kind: TaskKind,
    pub file_type: FileType,
    pub mode: ProcessingMode,
    pub created_at: DateTime<Utc>,
    pub metadata: FileMetadata,
    status: AtomicU8,
    completed_at: Mutex<Option<DateTime<Utc>>>,
    cancellation_reason: Mutex<Option<String>>,
    owned_resources: Mutex<Vec<PathBuf>>,
    cancel_token: CancellationToken,
}

impl TaskEntry {
    pub fn new(kind: TaskKind, mode: ProcessingMode, metadata: FileMetadata) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            file_type: metadata.detected_file_type,
            mode,
            created_at: Utc::now(),
            metadata,
            status: AtomicU8::new(TaskStatus::Pending as u8),
            completed_at: Mutex::new(None),
            cancellation_reason: Mutex::new(None),
            owned_resources: Mutex::new(Vec::new()),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// 推进到非终止状态；不允许回退，终止后无效。返回是否写入
    pub fn transition(&self, next: TaskStatus) -> bool {
        if next.is_terminal() {
            return self.finish(next);
        }
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            let current_status = TaskStatus::from_u8(current);
            if current_status.is_terminal() || next.rank() < current_status.rank() {
                return false;
            }
            match self.status.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// 进入终止状态。只有第一个调用者返回 `true`
    pub fn finish(&self, terminal: TaskStatus) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            if TaskStatus::from_u8(current).is_terminal() {
                return false;
            }
            match self.status.compare_exchange(
                current,
                terminal as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    *lock(&self.completed_at) = Some(Utc::now());
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// 设置协作式取消标志并记录原因（原因只记录第一次）
    pub fn request_cancel(&self, reason: &str) {
        {
            let mut slot = lock(&self.cancellation_reason);
            if slot.is_none() {
                *slot = Some(reason.to_string());
            }
        }
        self.cancel_token.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancellation_reason(&self) -> Option<String> {
        lock(&self.cancellation_reason).clone()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.completed_at)
    }

    /// 登记任务结束时需要删除的临时文件或目录
    pub fn add_resource(&self, path: impl Into<PathBuf>) {
        lock(&self.owned_resources).push(path.into());
    }

    pub fn take_resources(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *lock(&self.owned_resources))
    }

    /// 状态快照；只有已取消的任务才带取消原因
    pub fn snapshot(&self) -> TaskSnapshot {
        let status = self.status();
        TaskSnapshot {
            task_id: self.id.to_string(),
            status,
            file_type: self.file_type,
            processing_mode: self.mode,
            created_at: self.created_at,
            completed_at: self.completed_at(),
            cancellation_reason: match status {
                TaskStatus::Cancelled => self.cancellation_reason(),
                _ => None,
            },
            file_metadata: self.metadata.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 状态查询返回的任务快照
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub file_type: FileType,
    pub processing_mode: ProcessingMode,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub file_metadata: FileMetadata,
}
