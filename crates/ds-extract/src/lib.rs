pub mod docx;
pub mod pdf;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;

pub use ds_error::{DsError, Result};

use async_trait::async_trait;
use ds_core::{ExtractionResult, MediaType, UploadableFile};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// 默认抽取超时
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// 单个后端的抽取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: Option<usize>,
}

/// 格式相关的抽取后端
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, content: &[u8]) -> Result<ExtractedText>;

    /// 该后端负责的格式
    fn media_type(&self) -> MediaType;

    fn name(&self) -> &str;
}

/// 按声明格式分派到对应后端；不支持的格式直接失败，不触碰任何后端
#[derive(Clone)]
pub struct TextExtractor {
    backends: HashMap<MediaType, Arc<dyn Extractor>>,
    timeout: Duration,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_EXTRACTION_TIMEOUT)
    }
}

impl TextExtractor {
    /// 注册 PDF 与 DOCX 后端
    pub fn new(timeout: Duration) -> Self {
        Self::empty(timeout)
            .register(Arc::new(PdfExtractor::new()))
            .register(Arc::new(DocxExtractor::new()))
    }

    pub fn empty(timeout: Duration) -> Self {
        Self {
            backends: HashMap::new(),
            timeout,
        }
    }

    pub fn register(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.backends.insert(extractor.media_type(), extractor);
        self
    }

    pub fn supports(&self, media_type: &MediaType) -> bool {
        media_type.is_supported() && self.backends.contains_key(media_type)
    }

    #[instrument(skip(self, file), fields(file_name = %file.name, media_type = %file.media_type, size = file.size))]
    pub async fn extract(&self, file: &UploadableFile) -> Result<ExtractionResult> {
        let backend = match &file.media_type {
            MediaType::Unsupported(raw) => {
                return Err(DsError::UnsupportedFormat {
                    media_type: raw.clone(),
                })
            }
            supported => {
                self.backends
                    .get(supported)
                    .ok_or_else(|| DsError::UnsupportedFormat {
                        media_type: supported.to_string(),
                    })?
            }
        };

        let extracted = tokio::time::timeout(self.timeout, backend.extract(&file.content))
            .await
            .map_err(|_| DsError::Timeout {
                operation: format!("{}_extraction", backend.name()),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        tracing::debug!(
            backend = backend.name(),
            chars = extracted.text.len(),
            "extraction finished"
        );

        Ok(ExtractionResult {
            text: extracted.text,
            source: file.name.clone(),
            page_count: extracted.page_count,
        })
    }
}

pub(crate) fn parse_error(format: &str, message: impl std::fmt::Display) -> DsError {
    DsError::Parse {
        format: format.to_string(),
        message: message.to_string(),
    }
}

/// 在阻塞线程池上运行解析器；解析器 panic 同样视为解析失败
pub(crate) async fn parse_blocking<T, F>(format: &'static str, parse: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(parse)
        .await
        .map_err(|e| parse_error(format, format!("parser aborted: {}", e)))?
}
