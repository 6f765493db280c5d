use async_trait::async_trait;
use ds_error::DsError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache connection not initialised")]
    NotConnected,

    #[error("cache connection failed: {0}")]
    Connection(String),

    #[error("cache command {command} failed: {message}")]
    Command { command: String, message: String },
}

impl CacheError {
    pub fn command(command: &str, err: impl std::fmt::Display) -> Self {
        CacheError::Command {
            command: command.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<CacheError> for DsError {
    fn from(err: CacheError) -> Self {
        let operation = match &err {
            CacheError::NotConnected | CacheError::Connection(_) => "cache_connection".to_string(),
            CacheError::Command { command, .. } => command.clone(),
        };
        DsError::Cache {
            operation,
            message: err.to_string(),
        }
    }
}

/// 远程键值存储的最小命令集
///
/// 字符串值带过期时间写入；"最近浏览"列表为有界、按最近优先排列且整体共享一个过期时间。
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// 删除键；键不存在不是错误
    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// 将成员移到列表头部，截断到 `max_len`，并刷新整个列表的过期时间
    async fn push_recent(
        &self,
        key: &str,
        member: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> Result<(), CacheError>;

    /// 按最近优先返回列表；键不存在时返回空列表
    async fn list(&self, key: &str) -> Result<Vec<String>, CacheError>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_maps_to_cache_variant() {
        let err: DsError = CacheError::command("SETEX", "READONLY replica").into();
        assert!(matches!(err, DsError::Cache { ref operation, .. } if operation == "SETEX"));
        assert_eq!(err.to_http_status(), 500);

        let err: DsError = CacheError::NotConnected.into();
        assert_eq!(
            err.to_string(),
            "Cache error during cache_connection: cache connection not initialised"
        );
    }
}
