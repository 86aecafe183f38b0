//! 对话补全式翻译后端（SiliconFlow / DeepSeek 兼容接口）

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use super::{classify_status, classify_transport, extract_error_message, BackendKind, TranslationBackend};
use crate::translation::config::{constants, ProviderConfig};
use crate::translation::error::{BackendError, BackendErrorKind};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// 对话补全后端
pub struct ChatBackend {
    kind: BackendKind,
    client: reqwest::Client,
    provider: ProviderConfig,
    temperature: f32,
    max_tokens: u32,
    max_input_chars: usize,
}

impl ChatBackend {
    pub fn new(
        kind: BackendKind,
        client: reqwest::Client,
        provider: ProviderConfig,
        temperature: f32,
        max_tokens: u32,
        max_input_chars: usize,
    ) -> Self {
        Self {
            kind,
            client,
            provider,
            temperature,
            max_tokens,
            max_input_chars,
        }
    }

    fn api_key(&self) -> Option<&str> {
        self.provider
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    fn error(&self, kind: BackendErrorKind, message: impl Into<String>) -> BackendError {
        BackendError::new(self.kind, kind, message)
    }
}

#[async_trait]
impl TranslationBackend for ChatBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn max_input_chars(&self) -> Option<usize> {
        Some(self.max_input_chars)
    }

    async fn translate(&self, text: &str) -> Result<String, BackendError> {
        let api_key = self
            .api_key()
            .ok_or_else(|| self.error(BackendErrorKind::AuthMissing, "未配置 API 密钥"))?;

        let request = ChatRequest {
            model: &self.provider.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: constants::SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| self.error(BackendErrorKind::MalformedResponse, e.to_string()))?;

        tracing::debug!(
            "调用 {} 翻译 {} 字符: {}",
            self.kind,
            text.chars().count(),
            text.chars().take(50).collect::<String>()
        );

        let response = self
            .client
            .post(&self.provider.api_url)
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| classify_transport(self.kind, &e))?;

        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|e| classify_transport(self.kind, &e))?;

        if !status.is_success() {
            let message = extract_error_message(&payload);
            tracing::error!("{} 接口错误状态码: {}, 消息: {}", self.kind, status, message);
            return Err(classify_status(self.kind, status.as_u16(), &message));
        }

        let parsed: ChatResponse = serde_json::from_str(&payload).map_err(|e| {
            self.error(
                BackendErrorKind::MalformedResponse,
                format!("响应无法解析: {}", e),
            )
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(self.error(BackendErrorKind::MalformedResponse, "响应中没有译文"));
        }

        tracing::debug!("{} 翻译成功，{} 字符", self.kind, text.chars().count());
        Ok(content)
    }
}
