use chrono::{DateTime, Utc};
use ds_error::DsError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// 占位摘要的截断长度（按字符计）
pub const PREVIEW_LENGTH: usize = 200;
pub const TRUNCATION_MARKER: &str = "...";

/// 文档的声明格式
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Pdf,
    Docx,
    Unsupported(String),
}

impl MediaType {
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            PDF_MIME => MediaType::Pdf,
            DOCX_MIME => MediaType::Docx,
            _ => MediaType::Unsupported(essence),
        }
    }

    pub fn from_file_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => MediaType::Pdf,
            "docx" => MediaType::Docx,
            "" => MediaType::Unsupported("unknown".to_string()),
            other => MediaType::Unsupported(other.to_string()),
        }
    }

    /// 优先使用声明的 MIME 类型；缺失或为通用二进制类型时按扩展名推断
    pub fn detect(declared: Option<&str>, file_name: &str) -> Self {
        match declared.map(str::trim).filter(|m| !m.is_empty()) {
            Some(mime) if !mime.eq_ignore_ascii_case("application/octet-stream") => {
                MediaType::from_mime(mime)
            }
            _ => MediaType::from_file_name(file_name),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, MediaType::Unsupported(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Pdf => "pdf",
            MediaType::Docx => "docx",
            MediaType::Unsupported(raw) => raw,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 待上传文件：仅存在于选取与上传成功之间
#[derive(Debug, Clone)]
pub struct UploadableFile {
    pub content: Vec<u8>,
    pub media_type: MediaType,
    pub name: String,
    pub size: u64,
}

impl UploadableFile {
    pub fn new(name: impl Into<String>, media_type: MediaType, content: Vec<u8>) -> Self {
        let size = content.len() as u64;
        Self {
            content,
            media_type,
            name: name.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub source: String,
    pub page_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl UploadPayload {
    pub fn validate(&self) -> Result<(), DsError> {
        if self.title.trim().is_empty() || self.text.is_empty() {
            return Err(DsError::validation("Title and text are required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub summary: String,
    pub original_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

/// 统一的错误响应体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// 上传进度状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UploadProgressState {
    #[default]
    Idle,
    Extracting,
    Summarizing,
    Succeeded,
    Failed,
}

impl UploadProgressState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Extracting | Self::Summarizing)
    }

    /// 仅空闲或终态时允许开始新的上传
    pub fn can_start(&self) -> bool {
        !self.is_in_flight()
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        use UploadProgressState::*;
        match (self, next) {
            (Idle | Succeeded | Failed, Extracting) => true,
            (Extracting, Summarizing) => true,
            (Summarizing, Succeeded) => true,
            (Extracting | Summarizing, Failed) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: Self) -> Result<Self, DsError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DsError::Internal {
                message: format!("invalid upload state transition {:?} -> {:?}", self, next),
                details: None,
            })
        }
    }
}

/// 缓存键命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    UserSession,
    DocumentMetadata,
    QueryResults,
    RecentlyViewed,
}

impl CacheNamespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::UserSession => "user:session:",
            CacheNamespace::DocumentMetadata => "document:metadata:",
            CacheNamespace::QueryResults => "query:results:",
            CacheNamespace::RecentlyViewed => "user:recently_viewed:",
        }
    }

    pub fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix(), id)
    }
}

/// AI 派生文本的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Summary,
    BulletPoints,
    Sentiment,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Summary => "summary",
            AnalysisKind::BulletPoints => "bullet_points",
            AnalysisKind::Sentiment => "sentiment",
        }
    }
}

/// 持久化的文档记录，`version` 用于乐观并发控制
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub media_type: Option<String>,
    pub text_length: usize,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 字段级更新
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub summary: Option<String>,
}

/// 截取前 `limit` 个字符，超长时追加截断标记
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
