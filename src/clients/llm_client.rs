//! LLM 客户端 - 客户端层
//!
//! 只负责"发一条 system + user 消息，拿回一段文本"，不关心出题
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型（兼容 OpenAI API 的服务）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};

/// 单次调用参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl CompletionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }
}

/// 对话模型
///
/// 出题流程只依赖这个 trait，测试里用脚本化的实现替换真实 API
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 模型名称（用于日志和错误信息）
    fn model_name(&self) -> &str;

    /// 发送一轮对话，返回去掉首尾空白的回复文本
    async fn complete(
        &self,
        system_message: &str,
        user_message: &str,
        options: CompletionOptions,
    ) -> AppResult<String>;
}

/// OpenAI 兼容的对话模型
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl OpenAiChat {
    /// 创建新的客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(
        &self,
        system_message: &str,
        user_message: &str,
        options: CompletionOptions,
    ) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let model = self.model_name.as_str();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(options.temperature)
            .max_tokens(options.max_tokens)
            .build()
            .map_err(|e| AppError::llm_api_failed(model, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(model, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}
