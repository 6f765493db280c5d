use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub mod anthropic;
pub mod openai;
pub mod summarizer;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use ds_error::{DsError, Result};
pub use openai::{OpenAiCompatClient, OpenAiCompatConfig};
pub use summarizer::{LlmSummarizer, Summarizer};

/// 单轮对话请求
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl<'a> ChatRequest<'a> {
    pub fn new(system: &'a str, prompt: &'a str) -> Self {
        Self {
            system,
            prompt,
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, req: &ChatRequest<'_>) -> Result<String>;

    fn provider(&self) -> &str;
}

/// 发送请求并解析 JSON；非 2xx 映射为 `LlmService`，429/5xx 可重试
pub(crate) async fn send_json<R: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<R> {
    let resp = request.send().await.map_err(|e| DsError::Network {
        operation: format!("{}_request", provider),
        message: e.to_string(),
    })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let retry_after = (status.as_u16() == 429 || status.is_server_error())
            .then(|| std::time::Duration::from_secs(30));
        return Err(DsError::LlmService {
            provider: provider.to_string(),
            message: format!("status={} body={}", status, body),
            retry_after,
        });
    }

    resp.json::<R>().await.map_err(|e| DsError::LlmService {
        provider: provider.to_string(),
        message: format!("malformed response: {}", e),
        retry_after: None,
    })
}

// ========== Provider Factory & Config ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ChatProviderConfig {
    #[serde(rename = "openai_compat")]
    OpenAiCompat {
        base_url: String,
        api_key: String,
        model: String,
    },
    #[serde(rename = "anthropic")]
    Anthropic {
        api_url: Option<String>,
        api_key: String,
        model: String,
    },
}

pub fn make_chat_model(cfg: ChatProviderConfig) -> Box<dyn ChatModel> {
    match cfg {
        ChatProviderConfig::OpenAiCompat {
            base_url,
            api_key,
            model,
        } => Box::new(OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url,
            api_key,
            model,
        })),
        ChatProviderConfig::Anthropic {
            api_url,
            api_key,
            model,
        } => Box::new(AnthropicClient::new(AnthropicConfig {
            api_url: api_url.unwrap_or_else(|| anthropic::DEFAULT_API_URL.into()),
            api_key,
            model,
        })),
    }
}
