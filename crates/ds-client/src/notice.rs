use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// 提示的展示时长
pub const NOTICE_LIFETIME: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub created_at: Instant,
}

impl Notice {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= NOTICE_LIFETIME
    }
}

/// 最多持有一条提示，新提示覆盖旧提示
#[derive(Default)]
pub struct NoticeBoard {
    current: Mutex<Option<Notice>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, message: impl Into<String>) {
        let notice = Notice {
            message: message.into(),
            created_at: Instant::now(),
        };
        tracing::info!(message = %notice.message, "notice published");
        *self.current.lock().await = Some(notice);
    }

    pub async fn current(&self) -> Option<Notice> {
        let mut current = self.current.lock().await;
        if current
            .as_ref()
            .is_some_and(|n| n.is_expired(Instant::now()))
        {
            *current = None;
        }
        current.clone()
    }

    pub async fn dismiss(&self) {
        self.current.lock().await.take();
    }
}
