use std::sync::Arc;

use ds_core::{ErrorBody, UploadPayload, UploadProgressState, UploadResponse, UploadableFile};
use ds_error::{DsError, Result};
use ds_extract::TextExtractor;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::notice::NoticeBoard;
use crate::source::FileSource;
use crate::store::ClientStore;

pub const UPLOAD_ERROR_PREFIX: &str = "Error uploading document: ";
const MISSING_INPUT: &str = "Please select a file and enter a title";

/// `submit` 的结果；已有上传进行中时忽略本次提交
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Completed(UploadResponse),
    Ignored,
}

#[derive(Default)]
struct CoordinatorState {
    progress: UploadProgressState,
    last_result: Option<UploadResponse>,
}

/// 上传协调器：抽取 → 提交 → 持久化原文
///
/// 同一时刻至多一个上传；任一阶段失败都会发布一条提示，协调器保持可用。
pub struct UploadCoordinator {
    http: Client,
    base_url: String,
    extractor: Arc<TextExtractor>,
    store: ClientStore,
    notices: Arc<NoticeBoard>,
    state: Mutex<CoordinatorState>,
}

impl UploadCoordinator {
    pub fn new(base_url: impl Into<String>, extractor: Arc<TextExtractor>, store: ClientStore) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            extractor,
            store,
            notices: Arc::new(NoticeBoard::new()),
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    pub fn notices(&self) -> Arc<NoticeBoard> {
        self.notices.clone()
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    pub async fn progress(&self) -> UploadProgressState {
        self.state.lock().await.progress
    }

    pub async fn last_result(&self) -> Option<UploadResponse> {
        self.state.lock().await.last_result.clone()
    }

    async fn report(&self, err: &DsError) {
        self.notices
            .publish(format!("{}{}", UPLOAD_ERROR_PREFIX, err.detail()))
            .await;
    }

    fn require_title(title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(DsError::validation(MISSING_INPUT));
        }
        Ok(())
    }

    async fn advance(&self, next: UploadProgressState) -> Result<()> {
        let mut state = self.state.lock().await;
        state.progress = state.progress.transition(next)?;
        Ok(())
    }

    /// 从文件来源取文件后提交
    pub async fn submit_from(&self, source: &dyn FileSource, title: &str) -> Result<Submission> {
        if let Err(e) = Self::require_title(title) {
            self.report(&e).await;
            return Err(e);
        }
        if !self.progress().await.can_start() {
            return Ok(Submission::Ignored);
        }
        let file = match source.fetch().await {
            Ok(file) => file,
            Err(e) => {
                warn!(source = %source.describe(), error = %e, "file source failed");
                self.report(&e).await;
                return Err(e);
            }
        };
        self.submit(Some(file), title).await
    }

    #[instrument(skip(self, file), fields(file_name = ?file.as_ref().map(|f| f.name.as_str())))]
    pub async fn submit(&self, file: Option<UploadableFile>, title: &str) -> Result<Submission> {
        let file = match file {
            Some(file) if Self::require_title(title).is_ok() => file,
            _ => {
                let e = DsError::validation(MISSING_INPUT);
                self.report(&e).await;
                return Err(e);
            }
        };

        {
            let mut state = self.state.lock().await;
            if !state.progress.can_start() {
                info!("upload already in flight, ignoring submit");
                return Ok(Submission::Ignored);
            }
            state.progress = state.progress.transition(UploadProgressState::Extracting)?;
        }

        match self.run(file, title).await {
            Ok(resp) => {
                if let Err(e) = self.store.set_original_text(&resp.original_text) {
                    warn!(error = %e, "failed to persist original text");
                }
                let mut state = self.state.lock().await;
                state.progress = state.progress.transition(UploadProgressState::Succeeded)?;
                state.last_result = Some(resp.clone());
                info!(chars = resp.original_text.len(), "upload succeeded");
                Ok(Submission::Completed(resp))
            }
            Err(e) => {
                {
                    let mut state = self.state.lock().await;
                    state.progress = UploadProgressState::Failed;
                }
                warn!(error = %e, "upload failed");
                self.report(&e).await;
                Err(e)
            }
        }
    }

    async fn run(&self, file: UploadableFile, title: &str) -> Result<UploadResponse> {
        let extracted = self.extractor.extract(&file).await?;
        self.advance(UploadProgressState::Summarizing).await?;

        let payload = UploadPayload {
            title: title.to_string(),
            text: extracted.text,
            user_id: self.store.user_id()?,
        };
        self.post(&payload).await
    }

    async fn post(&self, payload: &UploadPayload) -> Result<UploadResponse> {
        let url = format!("{}/upload", self.base_url.trim_end_matches('/'));
        let resp = self.http.post(url).json(payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                });
            return Err(DsError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json::<UploadResponse>().await?)
    }
}
