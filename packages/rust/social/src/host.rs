//! Media hosting sink: the CMS media library.

use std::time::Duration;

use async_trait::async_trait;
use postrelay_shared::{
    CmsSettings, MediaPublishError, PostRelayError, PublicMediaUrl, RenderedAsset, Result,
};
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::USER_AGENT;

/// Uploads a rendered creative somewhere the social platforms can fetch it.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Single upload attempt. Success requires a public URL in the response.
    async fn publish(
        &self,
        asset: &RenderedAsset,
        filename: &str,
    ) -> std::result::Result<PublicMediaUrl, MediaPublishError>;
}

/// Upload filename for an article's creative: `post_social_<id>.<ext>`.
pub fn asset_filename(post_id: &str, asset: &RenderedAsset) -> String {
    format!("post_social_{post_id}.{}", asset.extension())
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    source_url: Option<String>,
}

/// [`MediaHost`] backed by `POST /wp-json/wp/v2/media`.
pub struct WordPressMediaHost {
    client: Client,
    cms: CmsSettings,
}

impl WordPressMediaHost {
    pub fn new(cms: CmsSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PostRelayError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, cms })
    }
}

#[async_trait]
impl MediaHost for WordPressMediaHost {
    #[instrument(skip_all, fields(filename = %filename, size = asset.bytes.len()))]
    async fn publish(
        &self,
        asset: &RenderedAsset,
        filename: &str,
    ) -> std::result::Result<PublicMediaUrl, MediaPublishError> {
        let url = format!("{}/wp-json/wp/v2/media", self.cms.base_url);
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_DISPOSITION, format!("attachment; filename={filename}"))
            .header(CONTENT_TYPE, asset.mime_type.as_str())
            .body(asset.bytes.clone());
        if let Some((user, password)) = self.cms.credentials() {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| MediaPublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaPublishError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| MediaPublishError::Transport(format!("invalid response body: {e}")))?;

        let url = uploaded
            .source_url
            .filter(|u| !u.trim().is_empty())
            .ok_or(MediaPublishError::MissingUrl)?;

        info!(%url, "creative uploaded");
        Ok(PublicMediaUrl::new(url))
    }
}
