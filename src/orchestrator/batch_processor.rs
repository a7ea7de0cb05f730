//! 分批处理器 - 编排层
//!
//! ## 职责
//!
//! 把一个任务的全部单元按 `batch_size` 分批，每批内部并发执行，批与批之间串行。
//!
//! ## 核心规则
//!
//! 1. 每个单元完成（成功或失败）后发布 `UnitCompleted`，携带按 index 排序的累计结果
//! 2. 单元失败只记录，不中断任务
//! 3. 每批开始前、每个单元开始前检查取消标志
//! 4. 识别耗时按单元求和；增强耗时每批取最大值，再跨批求和

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::info;

use crate::infrastructure::ProgressChannel;
use crate::models::{
    ProgressEvent, TaskEntry, TaskStatus, TimingSummary, UnitPayload, UnitProgress, UnitStatus,
    WorkUnit,
};
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::{UnitCtx, UnitFlow};

/// 批处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// 全部单元处理完（允许部分失败），携带最终进度
    Finished(UnitProgress),
    /// 在安全点发现取消标志而停止
    Cancelled { executed_units: usize },
}

/// 分批处理器
pub struct PageBatchCoordinator {
    batch_size: usize,
}

impl PageBatchCoordinator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// 处理全部单元
    ///
    /// # 参数
    /// - `entry`: 任务条目（读取取消标志、推进状态）
    /// - `flow`: 单元处理流程
    /// - `payloads`: 按 index 排列的单元输入
    /// - `channel`: 进度通道
    pub async fn run(
        &self,
        entry: &TaskEntry,
        flow: &UnitFlow,
        payloads: &[UnitPayload],
        channel: &ProgressChannel,
    ) -> BatchOutcome {
        let total = payloads.len();
        let total_batches = total.div_ceil(self.batch_size);
        let started = Instant::now();

        let mut results: BTreeMap<usize, WorkUnit> = BTreeMap::new();
        let mut timing = TimingSummary::default();

        for (batch_idx, group) in payloads.chunks(self.batch_size).enumerate() {
            if entry.is_cancel_requested() {
                info!("[任务 {}] 🛑 检测到取消标志，停止分批处理", entry.id);
                return BatchOutcome::Cancelled {
                    executed_units: results.len(),
                };
            }

            let batch_num = batch_idx + 1;
            log_batch_start(
                &entry.id,
                batch_num,
                total_batches,
                group.first().map(|p| p.index).unwrap_or_default(),
                group.last().map(|p| p.index).unwrap_or_default(),
                total,
            );
            entry.transition(TaskStatus::Processing);

            let percent_before = percent(results.len(), total);
            let mut running: FuturesUnordered<_> = group
                .iter()
                .map(|payload| {
                    let ctx = UnitCtx::new(entry.id, payload.index, total, percent_before);
                    async move {
                        if entry.is_cancel_requested() {
                            return None;
                        }
                        Some(flow.run(&ctx, payload, channel).await)
                    }
                })
                .collect();

            let mut group_enhancement = 0.0_f64;
            let mut group_succeeded = 0;
            let mut group_finished = 0;

            while let Some(finished) = running.next().await {
                let Some(unit) = finished else {
                    continue;
                };

                timing.total_acquisition_secs += unit.timing.acquisition_secs;
                group_enhancement = group_enhancement.max(unit.timing.enhancement_secs);
                group_finished += 1;
                if unit.status == UnitStatus::Succeeded {
                    group_succeeded += 1;
                }

                results.insert(unit.index, unit.clone());
                entry.transition(TaskStatus::PageCompleted);
                channel.publish(ProgressEvent::UnitCompleted(build_progress(
                    &results,
                    total,
                    Some(unit),
                    started,
                    None,
                )));
            }

            timing.total_enhancement_secs += group_enhancement;
            log_batch_complete(&entry.id, batch_num, group_succeeded, group_finished);
        }

        if entry.is_cancel_requested() {
            return BatchOutcome::Cancelled {
                executed_units: results.len(),
            };
        }

        timing.wall_clock_secs = round1(started.elapsed().as_secs_f64());
        BatchOutcome::Finished(build_progress(&results, total, None, started, Some(timing)))
    }
}

fn build_progress(
    results: &BTreeMap<usize, WorkUnit>,
    total: usize,
    latest: Option<WorkUnit>,
    started: Instant,
    timing: Option<TimingSummary>,
) -> UnitProgress {
    let finished = results.len();
    let failed = results
        .values()
        .filter(|u| u.status == UnitStatus::Failed)
        .count();

    let remaining = total.saturating_sub(finished);
    let estimated_time_remaining = (finished > 0 && remaining > 0).then(|| {
        let average = started.elapsed().as_secs_f64() / finished as f64;
        round1(average * remaining as f64)
    });

    UnitProgress {
        latest,
        cumulative: results.values().cloned().collect(),
        processed_units: finished - failed,
        failed_units: failed,
        total_units: total,
        percent_complete: percent(finished, total),
        estimated_time_remaining,
        timing,
    }
}

fn percent(finished: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    round1(finished as f64 / total as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
