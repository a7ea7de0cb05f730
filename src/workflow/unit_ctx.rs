//! 单元处理上下文
//!
//! 封装"我正在处理哪个任务的第几个单元"这一信息

use std::fmt::Display;

use crate::models::TaskId;

/// 单元处理上下文
#[derive(Debug, Clone)]
pub struct UnitCtx {
    /// 任务ID
    pub task_id: TaskId,

    /// 单元编号（从1开始，PDF 为页码）
    pub unit_index: usize,

    /// 本任务的单元总数
    pub total_units: usize,

    /// 本单元开始时任务的完成百分比（用于状态事件）
    pub percent_complete: f64,
}

impl UnitCtx {
    pub fn new(task_id: TaskId, unit_index: usize, total_units: usize, percent_complete: f64) -> Self {
        Self {
            task_id,
            unit_index,
            total_units,
            percent_complete,
        }
    }
}

impl Display for UnitCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[任务 {} 单元#{}/{}]",
            self.task_id, self.unit_index, self.total_units
        )
    }
}
