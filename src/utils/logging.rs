/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::TaskId;

/// 初始化 tracing 订阅者
///
/// 优先使用 `RUST_LOG`，未设置时使用配置中的日志级别。重复调用无副作用。
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录服务启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 OCR 流式服务启动");
    info!("🌐 监听地址: {}", config.bind_addr());
    info!("📊 最大并发任务数: {}", config.max_concurrent_tasks);
    info!("📦 每批页数: {}", config.batch_size);
    info!("⏳ 元数据宽限期: {} 秒", config.grace_period_secs);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `task_id`: 任务ID
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `start`: 起始单元编号
/// - `end`: 结束单元编号
/// - `total`: 单元总数
pub fn log_batch_start(
    task_id: &TaskId,
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!(
        "[任务 {}] 📦 开始处理第 {}/{} 批，单元 {}-{} / 共 {} 个",
        task_id, batch_num, total_batches, start, end, total
    );
}

/// 记录批次完成信息
pub fn log_batch_complete(task_id: &TaskId, batch_num: usize, succeeded: usize, finished: usize) {
    info!(
        "[任务 {}] ✓ 第 {} 批完成: 成功 {}/{}",
        task_id, batch_num, succeeded, finished
    );
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
