use anyhow::Result;
use ocr_stream::utils::logging;
use ocr_stream::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(&config.log_level);

    // 初始化并运行应用
    App::initialize(config).await?.run().await
}
