//! 错误类型
//!
//! 按层次划分：任务 / 进度通道 / 外部协作服务 / 上传 / 配置。
//! 单页失败（`CollaboratorError`）只记录在该页结果中，不会中断任务。

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 任务相关错误
    #[error("任务错误: {0}")]
    Task(#[from] TaskError),
    /// 进度通道错误
    #[error("进度通道错误: {0}")]
    Channel(#[from] ChannelError),
    /// 外部协作服务错误（OCR / LLM / PDF 渲染）
    #[error("协作服务错误: {0}")]
    Collaborator(#[from] CollaboratorError),
    /// 上传校验错误
    #[error("上传错误: {0}")]
    Upload(#[from] UploadError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

/// 任务错误
#[derive(Debug, Error)]
pub enum TaskError {
    /// 任务不存在（或宽限期已过）
    #[error("任务不存在: {task_id}")]
    NotFound { task_id: String },
    /// 并发任务数已达上限
    #[error("并发任务数已达上限 ({limit})，请稍后重试")]
    TooManyTasks { limit: usize },
    /// 不可恢复的任务级错误，任务以 Failed 结束
    #[error("任务中止: {reason}")]
    Aborted { reason: String },
    /// 页码选择不合法
    #[error("页码选择无效: {reason}")]
    InvalidPageSelection { reason: String },
}

/// 进度通道错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// 已有消费者订阅，拒绝第二个订阅
    #[error("任务 {task_id} 已有订阅者")]
    AlreadyAttached { task_id: String },
    /// 终止事件之后继续读取
    #[error("任务 {task_id} 的进度通道已关闭")]
    ChannelClosed { task_id: String },
}

/// 外部协作服务错误
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// 网络请求失败
    #[error("{service} 请求失败: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// 服务返回错误状态码
    #[error("{service} 返回错误响应: HTTP {status}")]
    BadResponse { service: &'static str, status: u16 },
    /// 服务返回内容为空
    #[error("{service} 返回内容为空")]
    EmptyResponse { service: &'static str },
    /// LLM 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    Llm { model: String, message: String },
    /// 协作服务不支持流式输出
    #[error("该服务不支持流式输出")]
    StreamingUnsupported,
    /// PDF 渲染失败
    #[error("PDF 渲染失败: {message}")]
    Render { message: String },
    /// 读取页面图片失败
    #[error("读取页面图片失败 ({path}): {source}")]
    ReadPayload {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 上传校验错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 缺少文件字段
    #[error("缺少上传文件字段 'file'")]
    MissingFile,
    /// 不支持的文件类型
    #[error("不支持的文件类型: MIME={mime}, 文件名={filename}")]
    UnsupportedType { mime: String, filename: String },
    /// 文件过大
    #[error("文件过大: {size} 字节，最大允许 {max} 字节")]
    TooLarge { size: usize, max: usize },
    /// 请求参数错误
    #[error("请求参数错误: {reason}")]
    InvalidRequest { reason: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    FileParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值不合法
    #[error("配置值不合法: {reason}")]
    Invalid { reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建任务不存在错误
    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        AppError::Task(TaskError::NotFound {
            task_id: task_id.into(),
        })
    }

    /// 创建任务中止错误
    pub fn task_aborted(reason: impl Into<String>) -> Self {
        AppError::Task(TaskError::Aborted {
            reason: reason.into(),
        })
    }

    /// 创建请求参数错误
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        AppError::Upload(UploadError::InvalidRequest {
            reason: reason.into(),
        })
    }
}

impl CollaboratorError {
    /// 创建 LLM 调用错误
    pub fn llm(model: impl Into<String>, message: impl ToString) -> Self {
        CollaboratorError::Llm {
            model: model.into(),
            message: message.to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_error_display() {
        let err = AppError::task_not_found("abc");
        assert_eq!(err.to_string(), "任务错误: 任务不存在: abc");

        let err: AppError = ChannelError::AlreadyAttached {
            task_id: "t1".to_string(),
        }
        .into();
        assert!(err.to_string().contains("已有订阅者"));
    }
}
