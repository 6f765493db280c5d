use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{send_json, ChatModel, ChatRequest, Result};

/// OpenAI 兼容接口（OpenAI、DeepSeek 及多数代理）
#[derive(Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String, // e.g. https://api.openai.com
    pub api_key: String,
    pub model: String, // e.g. gpt-4o-mini
}

#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    cfg: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(cfg: OpenAiCompatConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionReply {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    #[instrument(skip(self, req), fields(model = %self.cfg.model))]
    async fn complete(&self, req: &ChatRequest<'_>) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let body = CompletionBody {
            model: &self.cfg.model,
            messages: [
                Message {
                    role: "system",
                    content: req.system,
                },
                Message {
                    role: "user",
                    content: req.prompt,
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let reply: CompletionReply = send_json(
            self.provider(),
            self.http
                .post(url)
                .bearer_auth(&self.cfg.api_key)
                .json(&body),
        )
        .await?;

        Ok(reply
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .unwrap_or_default())
    }

    fn provider(&self) -> &str {
        "openai_compat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DsError;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base_url: String) -> OpenAiCompatClient {
        OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url,
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
        })
    }

    #[tokio::test]
    async fn test_completion_sends_system_and_user_messages() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(
                        r#"{"model":"gpt-4o-mini","messages":[{"role":"system","content":"sys"},{"role":"user","content":"doc"}]}"#,
                    );
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "A short summary."}}]
                }));
            })
            .await;

        let out = client(server.base_url())
            .complete(&ChatRequest::new("sys", "doc"))
            .await
            .unwrap();
        assert_eq!(out, "A short summary.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_is_retryable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("slow down");
            })
            .await;

        let err = client(server.base_url())
            .complete(&ChatRequest::new("sys", "doc"))
            .await
            .unwrap_err();
        assert!(matches!(err, DsError::LlmService { .. }));
        assert!(err.is_retryable());
    }
}
