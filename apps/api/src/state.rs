use std::sync::Arc;
use std::time::Duration;

use ds_cache::{CacheGateway, CacheStore, MemoryCacheStore, RedisCacheStore};
use ds_extract::TextExtractor;
use ds_llm::{make_chat_model, ChatModel, ChatProviderConfig, LlmSummarizer, Summarizer};
use ds_service::{
    AnalysisService, DocumentService, DocumentUploadHandler, FallbackUploadHandler,
    MemoryDocumentRepository, UploadHandler,
};
use tracing::{info, warn};

use crate::config::{read_env, AppConfig, SummarizerCfg};

#[derive(Clone)]
pub struct AppState {
    pub upload: Arc<dyn UploadHandler>,
    pub analysis: AnalysisService,
    pub documents: DocumentService,
    pub cache: CacheGateway,
}

impl AppState {
    /// 降级模式：无 AI，内存缓存与内存文档库
    pub fn fallback(cache: CacheGateway) -> Self {
        Self {
            upload: Arc::new(FallbackUploadHandler),
            analysis: AnalysisService::degraded(cache.clone()),
            documents: DocumentService::new(
                Arc::new(MemoryDocumentRepository::new()),
                cache.clone(),
            ),
            cache,
        }
    }

    /// 完整模式
    pub fn full(
        summarizer: Arc<dyn Summarizer>,
        extractor: Arc<TextExtractor>,
        cache: CacheGateway,
    ) -> Self {
        let analysis = AnalysisService::new(summarizer, cache.clone());
        let documents =
            DocumentService::new(Arc::new(MemoryDocumentRepository::new()), cache.clone());
        Self {
            upload: Arc::new(DocumentUploadHandler::new(
                extractor,
                analysis.clone(),
                documents.clone(),
            )),
            analysis,
            documents,
            cache,
        }
    }
}

fn chat_provider(cfg: &SummarizerCfg) -> anyhow::Result<Option<ChatProviderConfig>> {
    if cfg.kind == "stub" {
        return Ok(None);
    }
    let api_key = match cfg.api_key_env.as_deref().map(read_env) {
        Some(Ok(key)) => key,
        Some(Err(e)) => {
            warn!(error = %e, "summarizer api key missing");
            return Ok(None);
        }
        None => return Ok(None),
    };
    let model = cfg
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("summarizer.model is required"))?;

    let provider = match cfg.kind.as_str() {
        "openai_compat" => ChatProviderConfig::OpenAiCompat {
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".into()),
            api_key,
            model,
        },
        "anthropic" => ChatProviderConfig::Anthropic {
            api_url: cfg.api_url.clone(),
            api_key,
            model,
        },
        other => anyhow::bail!("unknown summarizer kind: {}", other),
    };
    Ok(Some(provider))
}

/// 按配置组装状态；返回的 Redis 句柄用于关闭时释放连接
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<(AppState, Option<Arc<RedisCacheStore>>)> {
    let mut redis = None;
    let store: Arc<dyn CacheStore> = match cfg.redis_url() {
        Some(url) => {
            let client = Arc::new(RedisCacheStore::new(&url)?);
            if let Err(e) = client.connect().await {
                // 未连接时所有缓存操作为空操作
                warn!(error = %e, "redis unavailable, caching disabled");
            }
            redis = Some(client.clone());
            client
        }
        None => {
            info!("REDIS_URL not set; using in-process cache");
            Arc::new(MemoryCacheStore::new())
        }
    };
    let cache = CacheGateway::new(store);

    let provider = match cfg.summarizer.as_ref() {
        Some(s) => chat_provider(s)?,
        None => None,
    };

    let state = match provider {
        Some(provider) => {
            let chat: Arc<dyn ChatModel> = Arc::from(make_chat_model(provider));
            let mut summarizer = LlmSummarizer::new(chat);
            if let Some(max) = cfg.summarizer.as_ref().and_then(|s| s.max_input_chars) {
                summarizer = summarizer.with_max_input_chars(max);
            }
            let extractor = TextExtractor::new(Duration::from_secs(cfg.extraction.timeout_secs));
            AppState::full(Arc::new(summarizer), Arc::new(extractor), cache)
        }
        None => {
            warn!("no summarizer configured; serving uploads in fallback mode");
            AppState::fallback(cache)
        }
    };
    info!(
        mode = state.upload.name(),
        cache = state.cache.backend(),
        "state ready"
    );
    Ok((state, redis))
}
