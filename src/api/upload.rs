//! 上传处理：multipart 解析、类型识别、大小校验、落盘

use axum::body::Bytes;
use axum::extract::Multipart;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult, UploadError};
use crate::models::{FileMetadata, FileType, ProcessingOptions, SubmitRequest};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// multipart 中解析出的上传内容
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Bytes,
    pub options: ProcessingOptions,
}

/// 读取 `file` 与可选的 `request` 字段
pub async fn read_multipart(mut multipart: Multipart) -> AppResult<Upload> {
    let mut file: Option<(String, String, Bytes)> = None;
    let mut options = ProcessingOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_request(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid_request(e.to_string()))?;
                file = Some((filename, mime_type, bytes));
            }
            Some("request") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::invalid_request(e.to_string()))?;
                if !text.trim().is_empty() {
                    options = serde_json::from_str(&text).map_err(|e| {
                        AppError::invalid_request(format!("request 字段不是合法的 JSON: {}", e))
                    })?;
                }
            }
            other => debug!("忽略未知字段: {:?}", other),
        }
    }

    let (filename, mime_type, bytes) = file.ok_or(UploadError::MissingFile)?;
    Ok(Upload {
        filename,
        mime_type,
        bytes,
        options,
    })
}

/// 识别文件类型：先看文件头，再看 MIME 与扩展名
pub fn detect_file_type(bytes: &[u8], mime: &str, filename: &str) -> Result<FileType, UploadError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(FileType::Pdf);
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) || bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Ok(FileType::Image);
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if mime == "application/pdf" || extension == "pdf" {
        Ok(FileType::Pdf)
    } else if mime.starts_with("image/") || IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(FileType::Image)
    } else {
        Err(UploadError::UnsupportedType {
            mime: mime.to_string(),
            filename: filename.to_string(),
        })
    }
}

/// 校验文件大小
pub fn validate_size(file_type: FileType, size: usize, config: &Config) -> Result<(), UploadError> {
    if size == 0 {
        return Err(UploadError::InvalidRequest {
            reason: "上传文件为空".to_string(),
        });
    }
    let max = match file_type {
        FileType::Image => config.max_image_size,
        FileType::Pdf => config.max_pdf_size,
    };
    if size > max {
        return Err(UploadError::TooLarge { size, max });
    }
    Ok(())
}

/// 校验并落盘，生成提交请求
pub async fn prepare_submission(upload: Upload, config: &Config) -> AppResult<SubmitRequest> {
    let Upload {
        filename,
        mime_type,
        bytes,
        mut options,
    } = upload;

    let file_type = detect_file_type(&bytes, &mime_type, &filename)?;
    validate_size(file_type, bytes.len(), config)?;
    options.validate()?;

    let file_path = save_upload(Path::new(&config.upload_dir), file_type, &bytes).await?;

    Ok(SubmitRequest {
        file_path,
        metadata: FileMetadata {
            original_filename: filename,
            file_size_bytes: bytes.len(),
            mime_type,
            detected_file_type: file_type,
        },
        options,
    })
}

async fn save_upload(dir: &Path, file_type: FileType, bytes: &[u8]) -> AppResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let extension = match file_type {
        FileType::Image => "img",
        FileType::Pdf => "pdf",
    };
    let path = dir.join(format!("{}.{}", Uuid::new_v4(), extension));
    tokio::fs::write(&path, bytes).await?;
    debug!("上传文件已保存: {}", path.display());
    Ok(path)
}
