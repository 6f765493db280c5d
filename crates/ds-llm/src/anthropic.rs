use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{send_json, ChatModel, ChatRequest, Result};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String, // e.g. claude-3-5-haiku-latest
}

#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    cfg: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(cfg: AnthropicConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }
}

#[derive(Serialize)]
struct TextBlock<'a> {
    r#type: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct UserTurn<'a> {
    role: &'static str,
    content: [TextBlock<'a>; 1],
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    system: &'a str,
    messages: [UserTurn<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ReplyBlock>,
}

#[derive(Deserialize)]
struct ReplyBlock {
    text: Option<String>,
}

#[async_trait]
impl ChatModel for AnthropicClient {
    #[instrument(skip(self, req), fields(model = %self.cfg.model))]
    async fn complete(&self, req: &ChatRequest<'_>) -> Result<String> {
        let url = format!("{}/v1/messages", self.cfg.api_url.trim_end_matches('/'));
        let body = MessagesBody {
            model: &self.cfg.model,
            system: req.system,
            messages: [UserTurn {
                role: "user",
                content: [TextBlock {
                    r#type: "text",
                    text: req.prompt,
                }],
            }],
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };

        let reply: MessagesReply = send_json(
            self.provider(),
            self.http
                .post(url)
                .header("x-api-key", &self.cfg.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body),
        )
        .await?;

        // 只拼接文本块
        Ok(reply.content.into_iter().filter_map(|b| b.text).collect())
    }

    fn provider(&self) -> &str {
        "anthropic"
    }
}
