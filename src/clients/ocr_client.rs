/// 外部 OCR 服务客户端
///
/// POST `{base_url}{endpoint}`，请求体 `{image, threshold, contrast_level}`，
/// 响应体 `{image?, text_response?}`。
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CollaboratorError;
use crate::models::UnitPayload;
use crate::services::{Recognition, RecognizeOptions, Recognizer};

const SERVICE: &str = "OCR";

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    image: &'a str,
    threshold: u32,
    contrast_level: f32,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    text_response: Option<String>,
}

/// OCR 客户端
pub struct OcrClient {
    http: reqwest::Client,
    url: String,
}

impl OcrClient {
    /// 创建新的 OCR 客户端
    pub fn new(config: &Config) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .timeout(config.ocr_timeout())
            .build()
            .map_err(|source| CollaboratorError::Request {
                service: SERVICE,
                source,
            })?;

        Ok(Self {
            http,
            url: format!("{}{}", config.ocr_base_url, config.ocr_endpoint),
        })
    }
}

#[async_trait]
impl Recognizer for OcrClient {
    async fn recognize(
        &self,
        payload: &UnitPayload,
        options: &RecognizeOptions,
    ) -> Result<Recognition, CollaboratorError> {
        let bytes = tokio::fs::read(&payload.image_path).await.map_err(|source| {
            CollaboratorError::ReadPayload {
                path: payload.image_path.display().to_string(),
                source,
            }
        })?;
        let image_base64 = BASE64.encode(&bytes);

        debug!(
            "调用 OCR 服务: {} (单元 {}, {} 字节)",
            self.url,
            payload.index,
            bytes.len()
        );

        let response = self
            .http
            .post(&self.url)
            .header("accept", "application/json")
            .json(&OcrRequest {
                image: &image_base64,
                threshold: options.threshold,
                contrast_level: options.contrast_level,
            })
            .send()
            .await
            .map_err(|source| CollaboratorError::Request {
                service: SERVICE,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("OCR 服务返回错误状态: {}", status);
            return Err(CollaboratorError::BadResponse {
                service: SERVICE,
                status: status.as_u16(),
            });
        }

        let body: OcrResponse =
            response
                .json()
                .await
                .map_err(|source| CollaboratorError::Request {
                    service: SERVICE,
                    source,
                })?;

        Ok(Recognition {
            text: body.text_response.unwrap_or_default(),
            // 服务没有返回处理后的图片时沿用原图
            processed_image_base64: Some(body.image.unwrap_or(image_base64)),
        })
    }
}
