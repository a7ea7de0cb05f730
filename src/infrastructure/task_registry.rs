//! 任务注册表 - 基础设施层
//!
//! 两个视图：
//! - Known：任务元数据，终止后再保留一个宽限期，用于回答状态查询和取消请求
//! - Active：正在处理、可以订阅进度的任务
//!
//! 另外，任务结束时还没有订阅者的通道会被保留到宽限期结束，
//! 迟到的订阅者仍能读到全部缓冲事件和终止事件。
//!
//! 始终满足 Known ⊇ Active。加锁顺序固定为 Known → Active → 保留通道。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::infrastructure::progress_channel::ProgressChannel;
use crate::models::{TaskEntry, TaskId};

/// 任务注册表（通过 `Arc` 注入，不使用全局变量）
#[derive(Default)]
pub struct TaskRegistry {
    known: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
    active: RwLock<HashMap<TaskId, ProgressChannel>>,
    unclaimed: RwLock<HashMap<TaskId, ProgressChannel>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时登记到 Known 与 Active
    pub async fn register(&self, entry: Arc<TaskEntry>, channel: ProgressChannel) {
        let id = entry.id;
        let mut known = self.known.write().await;
        let mut active = self.active.write().await;
        known.insert(id, entry);
        active.insert(id, channel);
        debug!("[任务 {}] 已登记，活跃任务数: {}", id, active.len());
    }

    pub async fn known(&self, id: &TaskId) -> Option<Arc<TaskEntry>> {
        self.known.read().await.get(id).cloned()
    }

    pub async fn active(&self, id: &TaskId) -> Option<ProgressChannel> {
        self.active.read().await.get(id).cloned()
    }

    pub async fn is_active(&self, id: &TaskId) -> bool {
        self.active.read().await.contains_key(id)
    }

    /// 取得可订阅的通道：活跃任务的通道，或已结束但尚无人订阅的通道（只能取走一次）
    pub async fn claim_stream(&self, id: &TaskId) -> Option<ProgressChannel> {
        if let Some(channel) = self.active(id).await {
            return Some(channel);
        }
        self.unclaimed.write().await.remove(id)
    }

    /// 从 Active 移除，Known 保留；尚无订阅者的通道转入保留区
    pub async fn deactivate(&self, id: &TaskId) -> bool {
        let mut active = self.active.write().await;
        let Some(channel) = active.remove(id) else {
            return false;
        };
        if !channel.is_attached() {
            self.unclaimed.write().await.insert(*id, channel);
            debug!("[任务 {}] 已移出活跃视图，通道保留至宽限期结束", id);
        } else {
            debug!("[任务 {}] 已移出活跃视图", id);
        }
        true
    }

    /// 从所有视图中彻底移除
    pub async fn forget(&self, id: &TaskId) -> bool {
        let mut known = self.known.write().await;
        let mut active = self.active.write().await;
        active.remove(id);
        self.unclaimed.write().await.remove(id);
        let removed = known.remove(id).is_some();
        if removed {
            debug!("[任务 {}] 元数据已清理", id);
        }
        removed
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    pub async fn known_count(&self) -> usize {
        self.known.read().await.len()
    }
}
