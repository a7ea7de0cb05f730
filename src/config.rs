//! 程序配置
//!
//! 加载顺序：默认值 → TOML 配置文件（`OCR_STREAM_CONFIG` 指定路径，可选）→ 环境变量覆盖。

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// 配置文件路径的环境变量名
pub const CONFIG_PATH_ENV: &str = "OCR_STREAM_CONFIG";

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 服务配置 ---
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 日志级别（RUST_LOG 未设置时使用）
    pub log_level: String,
    /// 上传文件存放目录
    pub upload_dir: String,

    // --- 任务调度配置 ---
    /// 同时处理的任务数量上限
    pub max_concurrent_tasks: usize,
    /// 每批并发处理的页数
    pub batch_size: usize,
    /// 任务结束后保留元数据的宽限期（秒）
    pub grace_period_secs: u64,
    /// SSE 空闲心跳间隔（秒）
    pub heartbeat_interval_secs: u64,
    /// 每个任务进度通道的缓冲容量
    pub channel_capacity: usize,

    // --- 文件限制 ---
    /// 图片最大字节数
    pub max_image_size: usize,
    /// PDF 最大字节数
    pub max_pdf_size: usize,
    /// PDF 最大页数
    pub max_pdf_pages: usize,
    /// PDF 转图片 DPI
    pub pdf_dpi: u32,
    /// pdftoppm 可执行文件路径
    pub pdftoppm_path: String,

    // --- OCR 服务配置 ---
    pub ocr_base_url: String,
    pub ocr_endpoint: String,
    pub ocr_timeout_secs: u64,
    pub default_threshold: u32,
    pub default_contrast_level: f32,

    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_default_prompt: String,
    /// 是否使用流式响应（部分兼容服务不支持 SSE 响应）
    pub llm_streaming: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            upload_dir: "./uploads".to_string(),
            max_concurrent_tasks: 5,
            batch_size: 3,
            grace_period_secs: 30,
            heartbeat_interval_secs: 30,
            channel_capacity: 256,
            max_image_size: 10 * 1024 * 1024,
            max_pdf_size: 50 * 1024 * 1024,
            max_pdf_pages: 10,
            pdf_dpi: 300,
            pdftoppm_path: "pdftoppm".to_string(),
            ocr_base_url: "http://localhost:9000/vision-world".to_string(),
            ocr_endpoint: "/process-image".to_string(),
            ocr_timeout_secs: 30,
            default_threshold: 500,
            default_contrast_level: 1.3,
            llm_api_key: String::new(),
            llm_api_base_url: "http://localhost:9001/v1".to_string(),
            llm_model_name: "nectec/Pathumma-vision-ocr-lora-dev".to_string(),
            llm_default_prompt: "ข้อความในภาพนี้".to_string(),
            llm_streaming: true,
        }
    }
}

impl Config {
    /// 从 TOML 文件加载（缺省字段使用默认值）
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            reason: format!("无法读取配置文件 {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    fn from_toml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::FileParseFailed {
            path: path.to_string(),
            source,
        })
    }

    /// 完整加载流程：配置文件（可选）→ 环境变量 → 校验
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 用环境变量覆盖已有配置
    pub fn with_env_overrides(self) -> Self {
        Self {
            host: env_or("HOST", self.host),
            port: env_or("PORT", self.port),
            log_level: env_or("LOG_LEVEL", self.log_level),
            upload_dir: env_or("UPLOAD_DIR", self.upload_dir),
            max_concurrent_tasks: env_or("MAX_CONCURRENT_TASKS", self.max_concurrent_tasks),
            batch_size: env_or("PDF_BATCH_SIZE", self.batch_size),
            grace_period_secs: env_or("GRACE_PERIOD_SECS", self.grace_period_secs),
            heartbeat_interval_secs: env_or("HEARTBEAT_INTERVAL_SECS", self.heartbeat_interval_secs),
            channel_capacity: env_or("CHANNEL_CAPACITY", self.channel_capacity),
            max_image_size: env_or("IMAGE_MAX_SIZE", self.max_image_size),
            max_pdf_size: env_or("MAX_PDF_SIZE", self.max_pdf_size),
            max_pdf_pages: env_or("MAX_PDF_PAGES", self.max_pdf_pages),
            pdf_dpi: env_or("PDF_DPI", self.pdf_dpi),
            pdftoppm_path: env_or("PDFTOPPM_PATH", self.pdftoppm_path),
            ocr_base_url: env_or("EXTERNAL_OCR_BASE_URL", self.ocr_base_url),
            ocr_endpoint: env_or("EXTERNAL_OCR_ENDPOINT", self.ocr_endpoint),
            ocr_timeout_secs: env_or("EXTERNAL_OCR_TIMEOUT", self.ocr_timeout_secs),
            default_threshold: env_or("DEFAULT_THRESHOLD", self.default_threshold),
            default_contrast_level: env_or("DEFAULT_CONTRAST_LEVEL", self.default_contrast_level),
            llm_api_key: env_or("LLM_API_KEY", self.llm_api_key),
            llm_api_base_url: env_or("LLM_API_BASE_URL", self.llm_api_base_url),
            llm_model_name: env_or("LLM_MODEL_NAME", self.llm_model_name),
            llm_default_prompt: env_or("LLM_DEFAULT_PROMPT", self.llm_default_prompt),
            llm_streaming: env_or("LLM_STREAMING", self.llm_streaming),
        }
    }

    /// 校验配置值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "batch_size 必须大于 0".to_string(),
            });
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_concurrent_tasks 必须大于 0".to_string(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "channel_capacity 必须大于 0".to_string(),
            });
        }
        if !(150..=600).contains(&self.pdf_dpi) {
            return Err(ConfigError::Invalid {
                reason: format!("pdf_dpi 必须在 150-600 之间，当前为 {}", self.pdf_dpi),
            });
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 读取环境变量，解析失败时保留原值
fn env_or<T: FromStr>(name: &str, current: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_partial_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            port = 9100
            batch_size = 2
            llm_model_name = "gpt-4o-mini"
            llm_streaming = false
            default_threshold = 700
            "#,
            "inline.toml",
        )
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.llm_model_name, "gpt-4o-mini");
        assert!(!config.llm_streaming);
        assert_eq!(config.default_threshold, 700);
        assert_eq!(config.default_contrast_level, 1.3);
        assert_eq!(config.grace_period_secs, 30);
        assert_eq!(config.max_concurrent_tasks, 5);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let err = Config::from_toml_str("port = \"not a number\"", "bad.toml").unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = Config {
            batch_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }
}
