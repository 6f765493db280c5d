use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ds_cache::CacheGateway;
use ds_core::{CacheNamespace, DocumentPatch, DocumentRecord};
use ds_error::{DsError, Result};
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

/// 新建文档所需字段
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub media_type: Option<String>,
    pub text_length: usize,
}

/// 文档元数据存储
///
/// 每个文档独立存储并携带版本号；`patch` 仅在 `expected_version` 与当前版本一致时生效。
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, doc: NewDocument) -> Result<DocumentRecord>;

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>>;

    async fn patch(
        &self,
        id: Uuid,
        patch: DocumentPatch,
        expected_version: u64,
    ) -> Result<DocumentRecord>;
}

#[derive(Default)]
pub struct MemoryDocumentRepository {
    docs: RwLock<HashMap<Uuid, DocumentRecord>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn insert(&self, doc: NewDocument) -> Result<DocumentRecord> {
        let now = Utc::now();
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            user_id: doc.user_id,
            title: doc.title,
            summary: doc.summary,
            media_type: doc.media_type,
            text_length: doc.text_length,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.docs.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        Ok(self.docs.read().await.get(&id).cloned())
    }

    async fn patch(
        &self,
        id: Uuid,
        patch: DocumentPatch,
        expected_version: u64,
    ) -> Result<DocumentRecord> {
        let mut docs = self.docs.write().await;
        let record = docs.get_mut(&id).ok_or_else(|| DsError::NotFound {
            resource: format!("document {}", id),
        })?;
        if record.version != expected_version {
            return Err(DsError::Conflict {
                details: format!(
                    "document {} is at version {}, expected {}",
                    id, record.version, expected_version
                ),
            });
        }
        if let Some(title) = patch.title {
            record.title = title;
        }
        if let Some(summary) = patch.summary {
            record.summary = summary;
        }
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

/// 文档读写：存储 + 元数据缓存 + 最近浏览
#[derive(Clone)]
pub struct DocumentService {
    repo: Arc<dyn DocumentRepository>,
    cache: CacheGateway,
}

impl DocumentService {
    pub fn new(repo: Arc<dyn DocumentRepository>, cache: CacheGateway) -> Self {
        Self { repo, cache }
    }

    pub fn cache(&self) -> &CacheGateway {
        &self.cache
    }

    #[instrument(skip(self, doc), fields(title = %doc.title))]
    pub async fn create(&self, doc: NewDocument) -> Result<DocumentRecord> {
        let record = self.repo.insert(doc).await?;
        self.cache
            .cache_document_metadata(&record.id.to_string(), &record)
            .await;
        if let Some(user_id) = record.user_id.as_deref() {
            self.cache
                .cache_recently_viewed(user_id, &record.id.to_string())
                .await;
        }
        info!(document_id = %record.id, "document stored");
        Ok(record)
    }

    /// 缓存优先读取；`viewer` 存在时记录最近浏览
    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid, viewer: Option<&str>) -> Result<DocumentRecord> {
        let doc_id = id.to_string();
        let key = CacheNamespace::DocumentMetadata.key(&doc_id);
        let record = match self.cache.fetch_from_cache::<DocumentRecord>(&key).await {
            Some(record) => record,
            None => {
                let record = self.repo.get(id).await?.ok_or_else(|| DsError::NotFound {
                    resource: format!("document {}", id),
                })?;
                self.cache.cache_document_metadata(&doc_id, &record).await;
                record
            }
        };
        if let Some(user_id) = viewer {
            self.cache.cache_recently_viewed(user_id, &doc_id).await;
        }
        Ok(record)
    }

    #[instrument(skip(self, patch))]
    pub async fn patch(
        &self,
        id: Uuid,
        patch: DocumentPatch,
        expected_version: u64,
    ) -> Result<DocumentRecord> {
        let record = self.repo.patch(id, patch, expected_version).await?;
        self.cache
            .cache_document_metadata(&id.to_string(), &record)
            .await;
        Ok(record)
    }
}
