use std::path::Path;

use ds_error::{DsError, Result};

pub const ORIGINAL_TEXT_KEY: &str = "originalText";
pub const USER_ID_KEY: &str = "userId";

fn storage_error(operation: &str, e: impl std::fmt::Display) -> DsError {
    DsError::Storage {
        operation: operation.to_string(),
        message: e.to_string(),
    }
}

/// 客户端持久化存储（sled），值为 UTF-8 字符串
#[derive(Clone)]
pub struct ClientStore {
    db: sled::Db,
}

impl ClientStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| storage_error("open", e))?;
        Ok(Self { db })
    }

    /// 进程退出即删除，用于测试与一次性运行
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| storage_error("open", e))?;
        Ok(Self { db })
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let value = self.db.get(key).map_err(|e| storage_error("get", e))?;
        value
            .map(|v| String::from_utf8(v.to_vec()).map_err(|e| storage_error("decode", e)))
            .transpose()
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .insert(key, value.as_bytes())
            .map_err(|e| storage_error("insert", e))?;
        self.db.flush().map_err(|e| storage_error("flush", e))?;
        Ok(())
    }

    pub fn user_id(&self) -> Result<Option<String>> {
        self.read(USER_ID_KEY)
    }

    pub fn set_user_id(&self, user_id: &str) -> Result<()> {
        self.write(USER_ID_KEY, user_id)
    }

    pub fn last_original_text(&self) -> Result<Option<String>> {
        self.read(ORIGINAL_TEXT_KEY)
    }

    pub fn set_original_text(&self, text: &str) -> Result<()> {
        self.write(ORIGINAL_TEXT_KEY, text)
    }

    pub fn clear(&self) -> Result<()> {
        self.db.clear().map_err(|e| storage_error("clear", e))?;
        self.db.flush().map_err(|e| storage_error("flush", e))?;
        Ok(())
    }
}
