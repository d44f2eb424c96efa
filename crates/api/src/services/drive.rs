//! Google Drive lookups with the user's own access token.

use agora_core::drive::DriveFile;
use async_trait::async_trait;
use serde::Deserialize;

use super::http::{send_json, UpstreamError};

const SERVICE: &str = "google drive";

#[async_trait]
pub trait GoogleDrive: Send + Sync {
    /// Files matching the Drive query `q`, most recently modified first.
    async fn list_files(
        &self,
        access_token: &str,
        q: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, UpstreamError>;
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

pub struct HttpGoogleDrive {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGoogleDrive {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl GoogleDrive for HttpGoogleDrive {
    async fn list_files(
        &self,
        access_token: &str,
        q: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, UpstreamError> {
        let page_size = page_size.to_string();
        let body = send_json(
            SERVICE,
            self.client
                .get(format!("{}/files", self.base_url))
                .bearer_auth(access_token)
                .query(&[
                    ("q", q),
                    ("pageSize", page_size.as_str()),
                    ("orderBy", "modifiedTime desc"),
                    ("fields", "files(id,name,mimeType,modifiedTime)"),
                ]),
        )
        .await?;
        let list: FileList = serde_json::from_value(body)
            .map_err(|e| UpstreamError::malformed(SERVICE, e.to_string()))?;
        Ok(list.files)
    }
}

/// Drive rejects expired or revoked tokens with 401.
pub fn is_expired_token(error: &UpstreamError) -> bool {
    matches!(error, UpstreamError::Status { status: 401, .. })
}
