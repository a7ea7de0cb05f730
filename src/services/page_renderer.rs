//! PDF 分页渲染能力 - 业务能力层

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::CollaboratorError;

/// 把 PDF 渲染为逐页图片
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// 渲染全部页面，返回按页码排列的图片路径（第 i 个元素是第 i+1 页）
    ///
    /// # 参数
    /// - `pdf`: PDF 文件路径
    /// - `dpi`: 渲染分辨率
    /// - `out_dir`: 输出目录（由调用方负责清理）
    async fn render(
        &self,
        pdf: &Path,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, CollaboratorError>;
}
