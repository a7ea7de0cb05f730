//! LLM 客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的视觉模型服务
//! - 图片以 `data:image/jpeg;base64,` URL 形式随用户消息发送

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CollaboratorError;
use crate::services::{EnhanceInput, Enhancer, TextStream};

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    default_prompt: String,
    streaming: bool,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            default_prompt: config.llm_default_prompt.clone(),
            streaming: config.llm_streaming,
        }
    }

    /// 构建请求：文本提示 + 图片
    fn build_request(
        &self,
        input: &EnhanceInput,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, CollaboratorError> {
        let model = self.model_name(input);
        let prompt = input
            .prompt
            .as_deref()
            .unwrap_or(self.default_prompt.as_str());

        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: format!("data:image/jpeg;base64,{}", input.image_base64),
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(
                content_parts,
            ))
            .build()
            .map_err(|e| CollaboratorError::llm(&model, e))?;

        CreateChatCompletionRequestArgs::default()
            .model(&model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(0.1)
            .max_tokens(2048u32)
            .stream(stream)
            .build()
            .map_err(|e| CollaboratorError::llm(&model, e))
    }
}

#[async_trait]
impl Enhancer for LlmClient {
    async fn enhance(&self, input: &EnhanceInput) -> Result<String, CollaboratorError> {
        let model = self.model_name(input);
        debug!("调用 LLM API，模型: {}，单元: {}", model, input.unit_index);

        let request = self.build_request(input, false)?;
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            CollaboratorError::llm(&model, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(CollaboratorError::EmptyResponse { service: "LLM" })?;

        Ok(content.trim().to_string())
    }

    fn model_name(&self, input: &EnhanceInput) -> String {
        input
            .model
            .clone()
            .unwrap_or_else(|| self.model_name.clone())
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn enhance_stream(&self, input: &EnhanceInput) -> Result<TextStream, CollaboratorError> {
        let model = self.model_name(input);
        debug!("调用 LLM 流式 API，模型: {}，单元: {}", model, input.unit_index);

        let request = self.build_request(input, true)?;
        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| CollaboratorError::llm(&model, e))?;

        let chunks = stream.filter_map(move |item| {
            let model = model.clone();
            async move {
                match item {
                    Ok(response) => {
                        let text: String = response
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .collect();
                        (!text.is_empty()).then_some(Ok(text))
                    }
                    Err(e) => Some(Err(CollaboratorError::llm(model, e))),
                }
            }
        });

        Ok(chunks.boxed())
    }
}
