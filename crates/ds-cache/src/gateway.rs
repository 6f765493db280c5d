use std::sync::Arc;

use ds_core::CacheNamespace;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};

use crate::memory::MemoryCacheStore;
use crate::store::CacheStore;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const DEFAULT_METADATA_TTL_SECS: u64 = 3600;
pub const DEFAULT_QUERY_TTL_SECS: u64 = 600;
pub const DEFAULT_RECENT_TTL_SECS: u64 = 3600;
pub const RECENTLY_VIEWED_LIMIT: usize = 50;

/// 缓存网关
///
/// 写操作为 fire-and-forget：失败只记录日志，不向调用方传播；
/// 读操作失败（含反序列化失败）一律视为未命中。
#[derive(Clone)]
pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    /// 缓存用户会话
    pub async fn cache_user_session<T: Serialize + ?Sized>(&self, user_id: &str, data: &T) {
        self.cache_user_session_with_ttl(user_id, data, DEFAULT_SESSION_TTL_SECS)
            .await
    }

    pub async fn cache_user_session_with_ttl<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        data: &T,
        ttl_secs: u64,
    ) {
        let key = CacheNamespace::UserSession.key(user_id);
        self.write_json(&key, data, ttl_secs).await
    }

    /// 缓存文档元数据
    pub async fn cache_document_metadata<T: Serialize + ?Sized>(&self, doc_id: &str, data: &T) {
        self.cache_document_metadata_with_ttl(doc_id, data, DEFAULT_METADATA_TTL_SECS)
            .await
    }

    pub async fn cache_document_metadata_with_ttl<T: Serialize + ?Sized>(
        &self,
        doc_id: &str,
        data: &T,
        ttl_secs: u64,
    ) {
        let key = CacheNamespace::DocumentMetadata.key(doc_id);
        self.write_json(&key, data, ttl_secs).await
    }

    /// 缓存查询结果
    pub async fn cache_query_results<T: Serialize + ?Sized>(&self, query_key: &str, results: &T) {
        self.cache_query_results_with_ttl(query_key, results, DEFAULT_QUERY_TTL_SECS)
            .await
    }

    pub async fn cache_query_results_with_ttl<T: Serialize + ?Sized>(
        &self,
        query_key: &str,
        results: &T,
        ttl_secs: u64,
    ) {
        let key = CacheNamespace::QueryResults.key(query_key);
        self.write_json(&key, results, ttl_secs).await
    }

    /// 记录最近浏览；每次追加都会刷新整个列表的过期时间
    pub async fn cache_recently_viewed(&self, user_id: &str, doc_id: &str) {
        self.cache_recently_viewed_with_ttl(user_id, doc_id, DEFAULT_RECENT_TTL_SECS)
            .await
    }

    #[instrument(skip(self))]
    pub async fn cache_recently_viewed_with_ttl(&self, user_id: &str, doc_id: &str, ttl_secs: u64) {
        let key = CacheNamespace::RecentlyViewed.key(user_id);
        if let Err(e) = self
            .store
            .push_recent(&key, doc_id, RECENTLY_VIEWED_LIMIT, ttl_secs)
            .await
        {
            warn!(key = %key, backend = self.store.name(), error = %e, "failed to record recently viewed document");
        }
    }

    /// 最近浏览列表（最近优先）
    pub async fn recently_viewed(&self, user_id: &str) -> Vec<String> {
        let key = CacheNamespace::RecentlyViewed.key(user_id);
        match self.store.list(&key).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(key = %key, backend = self.store.name(), error = %e, "failed to read recently viewed documents");
                Vec::new()
            }
        }
    }

    /// 使缓存失效；键不存在同样视为成功
    #[instrument(skip(self))]
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.del(key).await {
            warn!(key = %key, backend = self.store.name(), error = %e, "cache invalidation failed");
        }
    }

    /// 读取并反序列化；未命中、过期或任何读取失败均返回 `None`
    #[instrument(skip(self))]
    pub async fn fetch_from_cache<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, backend = self.store.name(), error = %e, "cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cached value could not be deserialized");
                None
            }
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl_secs: u64) {
        let value = match serde_json::to_string(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to serialize cache value");
                return;
            }
        };

        if let Err(e) = self.store.set_ex(key, value, ttl_secs).await {
            warn!(key = %key, backend = self.store.name(), error = %e, "cache write failed");
        } else {
            debug!(key = %key, ttl_secs, "cache write");
        }
    }
}
