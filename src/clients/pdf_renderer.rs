/// PDF 分页渲染客户端
///
/// 调用外部 `pdftoppm` 进程，把每一页输出为 `page-N.png`。
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::CollaboratorError;
use crate::services::PageRenderer;

const PAGE_PREFIX: &str = "page";

/// pdftoppm 渲染器
pub struct PdftoppmRenderer {
    binary: String,
    timeout: Duration,
}

impl PdftoppmRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.pdftoppm_path.clone(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[async_trait]
impl PageRenderer for PdftoppmRenderer {
    async fn render(
        &self,
        pdf: &Path,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, CollaboratorError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(out_dir.join(PAGE_PREFIX))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("执行 {} -r {} {}", self.binary, dpi, pdf.display());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CollaboratorError::Render {
                message: format!("pdftoppm 超时 ({} 秒)", self.timeout.as_secs()),
            })?
            .map_err(|e| CollaboratorError::Render {
                message: format!("无法启动 {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(CollaboratorError::Render {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let pages = collect_pages(out_dir).await?;
        if pages.is_empty() {
            return Err(CollaboratorError::Render {
                message: "PDF 中没有可渲染的页面".to_string(),
            });
        }

        info!("📄 PDF 渲染完成，共 {} 页 (DPI {})", pages.len(), dpi);
        Ok(pages)
    }
}

/// 收集 `page-N.png` 并按页码排序（pdftoppm 会按总页数补零）
async fn collect_pages(out_dir: &Path) -> Result<Vec<PathBuf>, CollaboratorError> {
    let mut entries = tokio::fs::read_dir(out_dir)
        .await
        .map_err(|e| CollaboratorError::Render {
            message: format!("无法读取输出目录 {}: {}", out_dir.display(), e),
        })?;

    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CollaboratorError::Render {
            message: e.to_string(),
        })?
    {
        let path = entry.path();
        if let Some(number) = page_number(&path) {
            pages.push((number, path));
        }
    }

    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(path: &Path) -> Option<usize> {
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(PAGE_PREFIX)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_number_parsing() {
        assert_eq!(page_number(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number(Path::new("/tmp/x/page-010.png")), Some(10));
        assert_eq!(page_number(Path::new("/tmp/x/page-1.jpg")), None);
        assert_eq!(page_number(Path::new("/tmp/x/other-1.png")), None);
    }

    #[tokio::test]
    async fn test_collect_pages_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png", "notes.txt"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let pages = collect_pages(dir.path()).await.unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-2.png", "page-10.png"]);
    }
}
