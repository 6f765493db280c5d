use std::sync::Arc;

use ds_cache::CacheGateway;
use ds_core::{preview, AnalysisKind, CacheNamespace, PREVIEW_LENGTH};
use ds_error::{DsError, Result};
use ds_llm::Summarizer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// 文本内容的 SHA-256 十六进制摘要
pub fn content_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub kind: AnalysisKind,
    pub result: String,
    pub cached: bool,
}

/// 带查询缓存的 AI 分析
///
/// 未配置 `Summarizer` 时为降级模式：摘要退化为文本预览，其余种类返回 503。
#[derive(Clone)]
pub struct AnalysisService {
    summarizer: Option<Arc<dyn Summarizer>>,
    cache: CacheGateway,
}

impl AnalysisService {
    pub fn new(summarizer: Arc<dyn Summarizer>, cache: CacheGateway) -> Self {
        Self {
            summarizer: Some(summarizer),
            cache,
        }
    }

    pub fn degraded(cache: CacheGateway) -> Self {
        Self {
            summarizer: None,
            cache,
        }
    }

    pub fn mode(&self) -> &str {
        self.summarizer
            .as_ref()
            .map(|s| s.name())
            .unwrap_or("preview")
    }

    #[instrument(skip(self, title, text), fields(kind = kind.as_str(), chars = text.len()))]
    pub async fn analyze(
        &self,
        kind: AnalysisKind,
        title: Option<&str>,
        text: &str,
    ) -> Result<AnalysisOutcome> {
        if text.is_empty() {
            return Err(DsError::validation("Text is required"));
        }

        let Some(summarizer) = self.summarizer.as_ref() else {
            return match kind {
                AnalysisKind::Summary => Ok(AnalysisOutcome {
                    kind,
                    result: preview(text, PREVIEW_LENGTH),
                    cached: false,
                }),
                _ => Err(DsError::ServiceUnavailable {
                    service: "summarizer".to_string(),
                    retry_after: None,
                }),
            };
        };

        let query_key = format!("{}:{}", kind.as_str(), content_key(text));
        let cache_key = CacheNamespace::QueryResults.key(&query_key);
        if let Some(result) = self.cache.fetch_from_cache::<String>(&cache_key).await {
            debug!(key = %cache_key, "analysis served from cache");
            return Ok(AnalysisOutcome {
                kind,
                result,
                cached: true,
            });
        }

        let result = summarizer.analyze(kind, title, text).await?;
        self.cache.cache_query_results(&query_key, &result).await;
        Ok(AnalysisOutcome {
            kind,
            result,
            cached: false,
        })
    }
}
