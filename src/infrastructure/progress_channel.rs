//! 进度通道 - 基础设施层
//!
//! 每个任务一个单生产者 / 单消费者的有序事件队列。
//!
//! - `publish` 永不阻塞；队列满时丢弃非终止事件
//! - 终止事件放入独立槽位并关闭发送端，消费者先读完队列中的事件，再读到终止事件
//! - 终止事件之后的发布一律拒绝
//! - 只允许一个订阅者

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::models::{ProgressEvent, TaskId};

/// 发布结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// 已入队（或终止事件已就位）
    Delivered,
    /// 队列已满或订阅者已断开，事件被丢弃
    Dropped,
    /// 通道已收到终止事件，拒绝继续发布
    Rejected,
}

struct ChannelInner {
    task_id: TaskId,
    sender: Mutex<Option<mpsc::Sender<ProgressEvent>>>,
    receiver: Mutex<Option<mpsc::Receiver<ProgressEvent>>>,
    terminal: Mutex<Option<ProgressEvent>>,
    closed: AtomicBool,
}

/// 任务进度通道（可克隆，克隆共享同一个队列）
#[derive(Clone)]
pub struct ProgressChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for ProgressChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressChannel")
            .field("task_id", &self.inner.task_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ProgressChannel {
    /// 创建新通道
    ///
    /// # 参数
    /// - `task_id`: 所属任务
    /// - `capacity`: 非终止事件的缓冲容量
    pub fn new(task_id: TaskId, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(ChannelInner {
                task_id,
                sender: Mutex::new(Some(tx)),
                receiver: Mutex::new(Some(rx)),
                terminal: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.inner.task_id
    }

    /// 发布事件（不阻塞）
    pub fn publish(&self, event: ProgressEvent) -> PublishOutcome {
        let mut sender = lock(&self.inner.sender);
        if self.inner.closed.load(Ordering::Acquire) {
            debug!(
                "[任务 {}] 通道已关闭，拒绝事件: {:?}",
                self.inner.task_id, event
            );
            return PublishOutcome::Rejected;
        }

        if event.is_terminal() {
            *lock(&self.inner.terminal) = Some(event);
            self.inner.closed.store(true, Ordering::Release);
            // 关闭发送端，消费者读完队列后拿到终止事件
            sender.take();
            return PublishOutcome::Delivered;
        }

        let Some(tx) = sender.as_ref() else {
            return PublishOutcome::Rejected;
        };
        match tx.try_send(event) {
            Ok(()) => PublishOutcome::Delivered,
            Err(TrySendError::Full(event)) => {
                warn!(
                    "[任务 {}] ⚠️ 进度缓冲区已满，丢弃事件: {:?}",
                    self.inner.task_id, event
                );
                PublishOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[任务 {}] 订阅者已断开，丢弃事件", self.inner.task_id);
                PublishOutcome::Dropped
            }
        }
    }

    /// 订阅（只允许一次）
    pub fn attach(&self) -> Result<ProgressSubscriber, ChannelError> {
        let receiver = lock(&self.inner.receiver)
            .take()
            .ok_or_else(|| ChannelError::AlreadyAttached {
                task_id: self.inner.task_id.to_string(),
            })?;

        Ok(ProgressSubscriber {
            inner: self.inner.clone(),
            receiver,
            finished: false,
        })
    }

    /// 是否已有订阅者
    pub fn is_attached(&self) -> bool {
        lock(&self.inner.receiver).is_none()
    }

    /// 是否已收到终止事件
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// 进度通道的唯一消费者
pub struct ProgressSubscriber {
    inner: Arc<ChannelInner>,
    receiver: mpsc::Receiver<ProgressEvent>,
    finished: bool,
}

impl std::fmt::Debug for ProgressSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSubscriber")
            .field("task_id", &self.inner.task_id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ProgressSubscriber {
    pub fn task_id(&self) -> TaskId {
        self.inner.task_id
    }

    /// 按发布顺序读取下一个事件；终止事件之后返回 `ChannelClosed`
    pub async fn next(&mut self) -> Result<ProgressEvent, ChannelError> {
        if self.finished {
            return Err(self.closed_error());
        }

        match self.receiver.recv().await {
            Some(event) => Ok(event),
            None => {
                self.finished = true;
                lock(&self.inner.terminal)
                    .take()
                    .ok_or_else(|| self.closed_error())
            }
        }
    }

    /// 限时读取；超时返回 `Ok(None)`，不消耗任何事件
    pub async fn next_within(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ProgressEvent>, ChannelError> {
        match tokio::time::timeout(timeout, self.next()).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn closed_error(&self) -> ChannelError {
        ChannelError::ChannelClosed {
            task_id: self.inner.task_id.to_string(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
