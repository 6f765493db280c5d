use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// 系统统一错误类型
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum DsError {
    // === 客户端/业务错误 ===
    #[error("{message}")]
    Validation { message: String },

    #[error("Unsupported file format: {media_type}")]
    UnsupportedFormat { media_type: String },

    #[error("Failed to parse {format}: {message}")]
    Parse { format: String, message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflict: {details}")]
    Conflict { details: String },

    // === 外部协作方错误 ===
    #[error("Network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("LLM service error ({provider}): {message}")]
    LlmService {
        provider: String,
        message: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("Service unavailable: {service}")]
    ServiceUnavailable {
        service: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("Cache error during {operation}: {message}")]
    Cache { operation: String, message: String },

    #[error("Storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    // === 系统错误 ===
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        details: Option<String>,
    },

    #[error("Configuration error: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("Serialization error ({format}): {message}")]
    Serialization { format: String, message: String },

    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Concurrency error during {operation}: {message}")]
    Concurrency { operation: String, message: String },
}

/// 严重级别，决定日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// 调用方输入问题
    Low,
    /// 外部协作方失败
    Medium,
    High,
    /// 配置或进程级故障
    Critical,
}

/// 单次错误的上下文，随日志输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub error_id: String,
    pub severity: ErrorSeverity,
    pub component: String,
    pub operation: Option<String>,
    pub document_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub context: BTreeMap<String, String>,
}

impl DsError {
    pub fn validation(message: impl Into<String>) -> Self {
        DsError::Validation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        DsError::Internal {
            message: message.into(),
            details: None,
        }
    }

    /// 严重级别
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DsError::Validation { .. }
            | DsError::UnsupportedFormat { .. }
            | DsError::NotFound { .. } => ErrorSeverity::Low,
            DsError::Parse { .. } | DsError::Conflict { .. } => ErrorSeverity::Medium,
            DsError::Network { .. }
            | DsError::Server { .. }
            | DsError::LlmService { .. }
            | DsError::ServiceUnavailable { .. }
            | DsError::Cache { .. }
            | DsError::Timeout { .. } => ErrorSeverity::Medium,
            DsError::Storage { .. }
            | DsError::Serialization { .. }
            | DsError::Concurrency { .. } => ErrorSeverity::High,
            DsError::Internal { .. } | DsError::Configuration { .. } => ErrorSeverity::Critical,
        }
    }

    /// 重试可能成功
    pub fn is_retryable(&self) -> bool {
        match self {
            DsError::ServiceUnavailable { retry_after, .. }
            | DsError::LlmService { retry_after, .. } => retry_after.is_some(),
            DsError::Network { .. } | DsError::Timeout { .. } => true,
            DsError::Server { status, .. } => *status == 429 || *status >= 500,
            DsError::Concurrency { .. } => true,
            _ => false,
        }
    }

    /// 建议的重试间隔
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            DsError::ServiceUnavailable { retry_after, .. }
            | DsError::LlmService { retry_after, .. } => *retry_after,
            DsError::Network { .. } => Some(std::time::Duration::from_millis(500)),
            DsError::Timeout { .. } => Some(std::time::Duration::from_millis(1000)),
            DsError::Concurrency { .. } => Some(std::time::Duration::from_millis(100)),
            _ => None,
        }
    }

    /// 面向用户展示的错误细节：服务端消息优先，其次为原始传输错误
    pub fn detail(&self) -> String {
        match self {
            DsError::Server { message, .. }
            | DsError::Network { message, .. }
            | DsError::Validation { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// 按严重级别输出一条结构化日志
    pub fn log(&self, meta: &ErrorMetadata) {
        let operation = meta.operation.as_deref().unwrap_or("-");
        let document_id = meta.document_id.as_deref().unwrap_or("-");
        match meta.severity {
            ErrorSeverity::Low => warn!(
                error_id = %meta.error_id,
                component = %meta.component,
                operation,
                document_id,
                error = %self,
                "request rejected"
            ),
            ErrorSeverity::Medium => warn!(
                error_id = %meta.error_id,
                component = %meta.component,
                operation,
                document_id,
                context = ?meta.context,
                error = %self,
                "collaborator failed"
            ),
            ErrorSeverity::High | ErrorSeverity::Critical => error!(
                error_id = %meta.error_id,
                component = %meta.component,
                operation,
                document_id,
                context = ?meta.context,
                severity = ?meta.severity,
                error = %self,
                "internal failure"
            ),
        }
    }

    pub fn to_http_status(&self) -> u16 {
        match self {
            DsError::Validation { .. } => 400,
            DsError::UnsupportedFormat { .. } => 415,
            DsError::Parse { .. } => 422,
            DsError::NotFound { .. } => 404,
            DsError::Conflict { .. } => 409,
            DsError::Network { .. } | DsError::LlmService { .. } => 502,
            DsError::Server { status, .. } => *status,
            DsError::ServiceUnavailable { .. } => 503,
            DsError::Timeout { .. } => 408,
            _ => 500,
        }
    }

    /// 可直接展示给终端用户的文案
    pub fn user_message(&self) -> String {
        match self {
            DsError::Validation { message } => message.clone(),
            DsError::UnsupportedFormat { .. } => {
                "Only PDF and DOCX documents are supported".to_string()
            }
            DsError::Parse { .. } => "The document could not be read".to_string(),
            DsError::NotFound { .. } => "The requested document does not exist".to_string(),
            DsError::Conflict { .. } => {
                "The document was changed by someone else, reload and retry".to_string()
            }
            DsError::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable, retry later".to_string()
            }
            DsError::Timeout { .. } => "The request timed out, retry".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// `ErrorMetadata` 构造器；严重级别在 `build` 时取自错误本身
pub struct ErrorMetadataBuilder {
    component: String,
    operation: Option<String>,
    document_id: Option<String>,
    context: BTreeMap<String, String>,
}

impl ErrorMetadataBuilder {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: None,
            document_id: None,
            context: BTreeMap::new(),
        }
    }

    pub fn operation(self, operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..self
        }
    }

    pub fn document_id(self, id: impl Into<String>) -> Self {
        Self {
            document_id: Some(id.into()),
            ..self
        }
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn build(self, error: &DsError) -> ErrorMetadata {
        ErrorMetadata {
            error_id: uuid::Uuid::new_v4().to_string(),
            severity: error.severity(),
            component: self.component,
            operation: self.operation,
            document_id: self.document_id,
            timestamp: chrono::Utc::now(),
            context: self.context,
        }
    }
}

pub type Result<T> = std::result::Result<T, DsError>;

impl From<reqwest::Error> for DsError {
    fn from(err: reqwest::Error) -> Self {
        let operation = match err.url() {
            Some(url) => format!("http {}", url.path()),
            None => "http_request".to_string(),
        };
        if err.is_timeout() {
            // reqwest 不暴露配置的超时时长
            DsError::Timeout {
                operation,
                timeout_ms: 30_000,
            }
        } else {
            DsError::Network {
                operation,
                message: err.to_string(),
            }
        }
    }
}

impl From<std::io::Error> for DsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DsError::NotFound {
                resource: err.to_string(),
            },
            kind => DsError::Internal {
                message: err.to_string(),
                details: Some(format!("{:?}", kind)),
            },
        }
    }
}

impl From<tokio::task::JoinError> for DsError {
    fn from(err: tokio::task::JoinError) -> Self {
        DsError::Concurrency {
            operation: "blocking_task".to_string(),
            message: err.to_string(),
        }
    }
}

// Axum integration
#[cfg(feature = "axum")]
impl IntoResponse for DsError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
