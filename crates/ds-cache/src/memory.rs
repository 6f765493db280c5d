use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::store::{CacheError, CacheStore};

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// 进程内缓存，未配置 Redis 时使用；语义与 Redis 实现一致（含过期与类型错误）
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(command: &str) -> CacheError {
    CacheError::command(
        command,
        "WRONGTYPE Operation against a key holding the wrong kind of value",
    )
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let entry = Entry {
            value: StoredValue::Text(value),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs.max(1)),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(Entry {
                value: StoredValue::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type("GET")),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn push_recent(
        &self,
        key: &str,
        member: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(ttl_secs.max(1));
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: StoredValue::List(VecDeque::new()),
            expires_at,
        });

        let StoredValue::List(list) = &mut entry.value else {
            return Err(wrong_type("LPUSH"));
        };
        list.retain(|m| m != member);
        list.push_front(member.to_string());
        list.truncate(max_len.max(1));
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => Ok(Vec::new()),
            Some(Entry {
                value: StoredValue::List(list),
                ..
            }) => Ok(list.iter().cloned().collect()),
            Some(_) => Err(wrong_type("LRANGE")),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
