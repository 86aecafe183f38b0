//! 通用翻译接口后端（`translate_a/single` 形式）

use async_trait::async_trait;

use super::{classify_status, classify_transport, extract_error_message, BackendKind, TranslationBackend};
use crate::translation::error::{BackendError, BackendErrorKind};

pub struct GoogleBackend {
    client: reqwest::Client,
    api_url: String,
    max_input_chars: usize,
}

impl GoogleBackend {
    pub fn new(client: reqwest::Client, api_url: String, max_input_chars: usize) -> Self {
        Self {
            client,
            api_url,
            max_input_chars,
        }
    }
}

/// 拼接 `[0][i][0]` 中的译文片段
fn collect_sentences(value: &serde_json::Value) -> Option<String> {
    let sentences = value.get(0)?.as_array()?;
    let text: String = sentences
        .iter()
        .filter_map(|sentence| sentence.get(0).and_then(|s| s.as_str()))
        .collect();
    Some(text)
}

#[async_trait]
impl TranslationBackend for GoogleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Google
    }

    fn max_input_chars(&self) -> Option<usize> {
        Some(self.max_input_chars)
    }

    async fn translate(&self, text: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", "zh-CN"),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| classify_transport(BackendKind::Google, &e))?;

        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|e| classify_transport(BackendKind::Google, &e))?;

        if !status.is_success() {
            return Err(classify_status(
                BackendKind::Google,
                status.as_u16(),
                &extract_error_message(&payload),
            ));
        }

        let value: serde_json::Value = serde_json::from_str(&payload).map_err(|e| {
            BackendError::new(
                BackendKind::Google,
                BackendErrorKind::MalformedResponse,
                format!("响应无法解析: {}", e),
            )
        })?;

        match collect_sentences(&value) {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(BackendError::new(
                BackendKind::Google,
                BackendErrorKind::MalformedResponse,
                "响应中没有译文",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_sentence_fragments() {
        let value: serde_json::Value =
            serde_json::from_str(r#"[[["你好，","Hello, ",null],["世界","world",null]],null,"en"]"#)
                .unwrap();
        assert_eq!(collect_sentences(&value).as_deref(), Some("你好，世界"));
    }

    #[test]
    fn rejects_unexpected_shape() {
        let value: serde_json::Value = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert!(collect_sentences(&value).is_none());
    }
}
