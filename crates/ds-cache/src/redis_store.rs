use async_trait::async_trait;
use ds_error::{DsError, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient};
use tokio::sync::RwLock;

use crate::store::{CacheError, CacheStore};

/// Redis 实现：启动时建立一个长期复用的连接，关闭时释放
///
/// `connect` 之前或 `shutdown` 之后的所有命令返回 `CacheError::NotConnected`。
pub struct RedisCacheStore {
    client: RedisClient,
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisCacheStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = RedisClient::open(redis_url).map_err(|e| DsError::Configuration {
            key: "redis_url".to_string(),
            reason: format!("Invalid Redis URL: {}", e),
        })?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
        })
    }

    /// 建立连接
    pub async fn connect(&self) -> std::result::Result<(), CacheError> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        *self.connection.write().await = Some(conn);
        tracing::info!("redis cache connected");
        Ok(())
    }

    /// 释放连接
    pub async fn shutdown(&self) {
        if self.connection.write().await.take().is_some() {
            tracing::info!("redis cache connection closed");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }

    async fn conn(&self) -> std::result::Result<MultiplexedConnection, CacheError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(CacheError::NotConnected)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn set_ex(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> std::result::Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1) as usize)
            .await
            .map_err(|e| CacheError::command("SETEX", e))
    }

    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| CacheError::command("GET", e))
    }

    async fn del(&self, key: &str) -> std::result::Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::command("DEL", e))
    }

    async fn push_recent(
        &self,
        key: &str,
        member: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> std::result::Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let stop = max_len.max(1) as isize - 1;
        redis::pipe()
            .atomic()
            .lrem(key, 0, member)
            .ignore()
            .lpush(key, member)
            .ignore()
            .ltrim(key, 0, stop)
            .ignore()
            .expire(key, ttl_secs.max(1) as usize)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CacheError::command("LPUSH", e))
    }

    async fn list(&self, key: &str) -> std::result::Result<Vec<String>, CacheError> {
        let mut conn = self.conn().await?;
        conn.lrange::<_, Vec<String>>(key, 0, -1)
            .await
            .map_err(|e| CacheError::command("LRANGE", e))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = RedisCacheStore::new("not-a-redis-url").err().unwrap();
        assert!(matches!(err, DsError::Configuration { ref key, .. } if key == "redis_url"));
    }

    #[tokio::test]
    async fn test_commands_before_connect_are_rejected() {
        let store = RedisCacheStore::new("redis://127.0.0.1:6390/").unwrap();
        assert!(!store.is_connected().await);
        assert_eq!(store.get("k").await, Err(CacheError::NotConnected));
        assert_eq!(
            store.set_ex("k", "v".into(), 10).await,
            Err(CacheError::NotConnected)
        );
    }

    /// 需要本地 Redis：`REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_redis_round_trip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let store = RedisCacheStore::new(&url).unwrap();
        store.connect().await.unwrap();

        store.set_ex("docsum:test:k", "v".into(), 30).await.unwrap();
        assert_eq!(store.get("docsum:test:k").await.unwrap(), Some("v".into()));
        store.del("docsum:test:k").await.unwrap();
        store.del("docsum:test:k").await.unwrap();

        store.del("docsum:test:recent").await.unwrap();
        store
            .push_recent("docsum:test:recent", "d1", 50, 30)
            .await
            .unwrap();
        store
            .push_recent("docsum:test:recent", "d2", 50, 30)
            .await
            .unwrap();
        assert_eq!(
            store.list("docsum:test:recent").await.unwrap(),
            vec!["d2".to_string(), "d1".to_string()]
        );

        store.shutdown().await;
        assert_eq!(store.get("docsum:test:k").await, Err(CacheError::NotConnected));
    }
}
