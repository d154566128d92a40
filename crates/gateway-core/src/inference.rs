//! Speaks the chat-completion HTTP protocol to the backend and parses the
//! assistant text out of the response envelope.

use crate::domain::{GenParams, Message};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Abstracts the backend call so tests can substitute a stub without a real
/// HTTP server. A plain async trait suffices since the gateway speaks to
/// exactly one backend shape rather than many provider dialects.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generates an assistant reply for the given message list.
    ///
    /// Must not be called while holding any session lock; the caller
    /// guarantees this. `timeout` bounds the call; on expiry this returns
    /// `GatewayError::Timeout`.
    async fn generate(
        &self,
        messages: &[Message],
        params: GenParams,
        timeout: Duration,
    ) -> Result<String>;
}

/// Request body for `POST {base_url}/v1/chat/completions`.
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
    extra_body: ExtraBody,
}

#[derive(Serialize)]
struct ExtraBody {
    enable_thinking: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

/// Production `GenerationBackend` speaking to a local llama.cpp/vLLM
/// OpenAI-compatible server over HTTP. Holds one shared, connection-pooling
/// `reqwest::Client` rather than building one per call.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_model(base_url, "default")
    }

    pub fn with_model(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let endpoint = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model: model.into(),
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(
        &self,
        messages: &[Message],
        params: GenParams,
        timeout: Duration,
    ) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            stream: false,
            extra_body: ExtraBody {
                enable_thinking: params.enable_thinking,
            },
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::from(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::BackendHttp {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let parsed: ChatCompletionResponse = resp.json().await.map_err(GatewayError::from)?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                GatewayError::BackendDecode("missing choices[0].message.content".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRole;

    #[test]
    fn request_body_serializes_expected_shape() {
        let messages = vec![Message {
            role: MessageRole::User,
            content: "hi".to_string(),
        }];
        let body = ChatCompletionRequest {
            model: "default",
            messages: &messages,
            temperature: 0.5,
            top_p: 0.9,
            max_tokens: 128,
            stream: false,
            extra_body: ExtraBody {
                enable_thinking: true,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "default");
        assert_eq!(value["stream"], false);
        assert_eq!(value["extra_body"]["enable_thinking"], true);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn response_parses_choices_content() {
        let raw = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}]
        });
        let parsed: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
    }
}
