use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::api;
use crate::clients::{LlmClient, OcrClient, PdftoppmRenderer};
use crate::config::Config;
use crate::orchestrator::{Collaborators, TaskProcessor};
use crate::utils::logging::log_startup;

/// 应用主结构
pub struct App {
    config: Arc<Config>,
    processor: TaskProcessor,
}

impl App {
    /// 初始化应用：创建协作服务客户端与任务处理器
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| format!("无法创建上传目录: {}", config.upload_dir))?;

        let collaborators = Collaborators {
            recognizer: Arc::new(OcrClient::new(&config).context("无法创建 OCR 客户端")?),
            enhancer: Some(Arc::new(LlmClient::new(&config))),
            renderer: Arc::new(PdftoppmRenderer::new(&config)),
        };

        let config = Arc::new(config);
        let processor = TaskProcessor::new(config.clone(), collaborators);

        Ok(Self { config, processor })
    }

    /// 运行 HTTP 服务，收到 Ctrl+C 后优雅退出
    pub async fn run(self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("无法监听地址: {}", addr))?;
        info!("✓ 服务已启动: http://{}", addr);

        axum::serve(listener, api::router(self.processor))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP 服务异常退出")?;

        info!("👋 服务已停止");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("收到退出信号，正在停止服务...");
    }
}
