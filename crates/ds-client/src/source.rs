use std::path::PathBuf;

use async_trait::async_trait;
use ds_core::{ErrorBody, MediaType, UploadableFile};
use ds_error::{DsError, Result};
use reqwest::Client;
use tracing::instrument;

pub const DEFAULT_DRIVE_API: &str = "https://www.googleapis.com/drive/v3";

/// 待上传文件的来源
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self) -> Result<UploadableFile>;

    fn describe(&self) -> String;
}

/// 本地文件，格式按扩展名推断
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self) -> Result<UploadableFile> {
        let content = tokio::fs::read(&self.path).await?;
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        let media_type = MediaType::from_file_name(&name);
        Ok(UploadableFile::new(name, media_type, content))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// 远程文件选择器（Drive v3）选中的文件
pub struct DriveFileSource {
    http: Client,
    api_base: String,
    access_token: String,
    file_id: String,
    file_name: String,
    mime_type: Option<String>,
}

impl DriveFileSource {
    pub fn new(
        access_token: impl Into<String>,
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: Option<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base: DEFAULT_DRIVE_API.to_string(),
            access_token: access_token.into(),
            file_id: file_id.into(),
            file_name: file_name.into(),
            mime_type,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl FileSource for DriveFileSource {
    #[instrument(skip(self), fields(file_id = %self.file_id))]
    async fn fetch(&self) -> Result<UploadableFile> {
        let url = format!(
            "{}/files/{}",
            self.api_base.trim_end_matches('/'),
            self.file_id
        );
        let resp = self
            .http
            .get(url)
            .query(&[("alt", "media")])
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| format!("Download failed with status {}", status));
            return Err(DsError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let content = resp.bytes().await?.to_vec();
        let media_type = MediaType::detect(self.mime_type.as_deref(), &self.file_name);
        Ok(UploadableFile::new(self.file_name.clone(), media_type, content))
    }

    fn describe(&self) -> String {
        format!("drive:{}", self.file_id)
    }
}
