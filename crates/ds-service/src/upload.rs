use std::sync::Arc;

use async_trait::async_trait;
use ds_core::{preview, AnalysisKind, UploadPayload, UploadResponse, UploadableFile, PREVIEW_LENGTH};
use ds_error::{DsError, Result};
use ds_extract::TextExtractor;
use tracing::{info, instrument};

use crate::analysis::AnalysisService;
use crate::repository::{DocumentService, NewDocument};

/// 上传的文件部分及其声明的 Content-Type
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file: UploadableFile,
    pub content_type: Option<String>,
}

impl FilePart {
    pub fn new(file: UploadableFile, content_type: Option<String>) -> Self {
        Self {
            file,
            content_type: non_empty(content_type).map(|ct| ct.trim().to_string()),
        }
    }
}

/// `POST /upload` 的请求体，文件优先于 JSON 文本
#[derive(Debug, Clone)]
pub enum UploadRequest {
    File {
        part: FilePart,
        title: Option<String>,
        user_id: Option<String>,
    },
    Text(UploadPayload),
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl UploadRequest {
    /// 由请求中解析出的各部分组装；文件与文本都缺失时返回校验错误
    pub fn from_parts(
        file: Option<FilePart>,
        title: Option<String>,
        text: Option<String>,
        user_id: Option<String>,
    ) -> Result<Self> {
        let title = non_empty(title);
        let user_id = non_empty(user_id);
        if let Some(part) = file {
            return Ok(UploadRequest::File {
                part,
                title,
                user_id,
            });
        }
        let text = text.filter(|t| !t.is_empty());
        if title.is_none() && text.is_none() {
            return Err(DsError::validation("No file or text provided"));
        }
        Ok(UploadRequest::Text(UploadPayload {
            title: title.unwrap_or_default(),
            text: text.unwrap_or_default(),
            user_id,
        }))
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            UploadRequest::File { user_id, .. } => user_id.as_deref(),
            UploadRequest::Text(payload) => payload.user_id.as_deref(),
        }
    }
}

/// 上传处理策略，启动时选定
#[async_trait]
pub trait UploadHandler: Send + Sync {
    async fn handle(&self, request: UploadRequest) -> Result<UploadResponse>;

    fn name(&self) -> &str;
}

/// 降级模式：不调用 AI，仅回显预览
#[derive(Debug, Clone, Default)]
pub struct FallbackUploadHandler;

impl FallbackUploadHandler {
    fn placeholder_summary(file: &UploadableFile, content_type: &str) -> String {
        format!(
            "Received {} ({}, {} bytes). Summarization is unavailable in fallback mode.",
            file.name, content_type, file.size
        )
    }
}

#[async_trait]
impl UploadHandler for FallbackUploadHandler {
    #[instrument(skip(self, request))]
    async fn handle(&self, request: UploadRequest) -> Result<UploadResponse> {
        match request {
            UploadRequest::File {
                part,
                title,
                user_id,
            } => {
                // 降级模式不做服务端抽取，只要求声明类型
                let Some(content_type) = part.content_type.as_deref() else {
                    return Err(DsError::validation("File must declare a media type"));
                };
                Ok(UploadResponse {
                    summary: Self::placeholder_summary(&part.file, content_type),
                    original_text: String::new(),
                    title,
                    user_id,
                    document_id: None,
                })
            }
            UploadRequest::Text(payload) => {
                payload.validate()?;
                Ok(UploadResponse {
                    summary: preview(&payload.text, PREVIEW_LENGTH),
                    original_text: payload.text,
                    title: Some(payload.title),
                    user_id: payload.user_id,
                    document_id: None,
                })
            }
        }
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

/// 完整模式：服务端抽取、AI 摘要、持久化与缓存
#[derive(Clone)]
pub struct DocumentUploadHandler {
    extractor: Arc<TextExtractor>,
    analysis: AnalysisService,
    documents: DocumentService,
}

impl DocumentUploadHandler {
    pub fn new(
        extractor: Arc<TextExtractor>,
        analysis: AnalysisService,
        documents: DocumentService,
    ) -> Self {
        Self {
            extractor,
            analysis,
            documents,
        }
    }

    fn default_title(file_name: &str) -> String {
        match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => file_name.to_string(),
        }
    }
}

#[async_trait]
impl UploadHandler for DocumentUploadHandler {
    #[instrument(skip(self, request), fields(user_id = ?request.user_id()))]
    async fn handle(&self, request: UploadRequest) -> Result<UploadResponse> {
        let (payload, media_type) = match request {
            UploadRequest::File {
                part: FilePart { file, .. },
                title,
                user_id,
            } => {
                let extracted = self.extractor.extract(&file).await?;
                let title = title.unwrap_or_else(|| Self::default_title(&file.name));
                (
                    UploadPayload {
                        title,
                        text: extracted.text,
                        user_id,
                    },
                    Some(file.media_type.as_str().to_string()),
                )
            }
            UploadRequest::Text(payload) => (payload, None),
        };
        payload.validate()?;

        let outcome = self
            .analysis
            .analyze(AnalysisKind::Summary, Some(&payload.title), &payload.text)
            .await?;

        let record = self
            .documents
            .create(NewDocument {
                user_id: payload.user_id.clone(),
                title: payload.title.clone(),
                summary: outcome.result.clone(),
                media_type,
                text_length: payload.text.chars().count(),
            })
            .await?;
        info!(document_id = %record.id, cached = outcome.cached, "upload summarized");

        Ok(UploadResponse {
            summary: outcome.result,
            original_text: payload.text,
            title: Some(payload.title),
            user_id: payload.user_id,
            document_id: Some(record.id.to_string()),
        })
    }

    fn name(&self) -> &str {
        "document"
    }
}
