//! Per-platform publishers.
//!
//! Image targets publish with a single call (Facebook) or a container plus
//! `media_publish` pair (Instagram feed). Video targets create a container,
//! poll its `status_code` until processing ends, then publish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use postrelay_shared::{Caption, Platform, PublicMediaUrl, Target, TargetError, TargetState};
use tracing::{debug, info, instrument, warn};

use crate::graph::{GraphClient, str_field};

/// Publishes the shared media URL and caption to one account.
#[async_trait]
pub trait SocialPublisher: Send + Sync {
    fn target(&self) -> &Target;

    /// Returns the platform post id on success.
    async fn publish(
        &self,
        media_url: &PublicMediaUrl,
        caption: &Caption,
    ) -> std::result::Result<String, TargetError>;
}

// ---------------------------------------------------------------------------
// Facebook page
// ---------------------------------------------------------------------------

pub struct FacebookPagePublisher {
    graph: Arc<GraphClient>,
    target: Target,
    page_id: String,
}

impl FacebookPagePublisher {
    pub fn new(graph: Arc<GraphClient>, page_id: String) -> Self {
        Self {
            graph,
            target: Target {
                platform: Platform::FacebookPage,
                account_id: Some(page_id.clone()),
            },
            page_id,
        }
    }
}

#[async_trait]
impl SocialPublisher for FacebookPagePublisher {
    fn target(&self) -> &Target {
        &self.target
    }

    #[instrument(skip_all, fields(target = %self.target))]
    async fn publish(
        &self,
        media_url: &PublicMediaUrl,
        caption: &Caption,
    ) -> std::result::Result<String, TargetError> {
        debug!(state = ?TargetState::Submitted, "posting photo");
        let response = self
            .graph
            .post(
                &format!("{}/photos", self.page_id),
                &[("url", media_url.as_str()), ("message", caption.text.as_str())],
            )
            .await?;

        // photo uploads return both the photo id and the feed post id
        let post_id = str_field(&response, "post_id").or_else(|_| str_field(&response, "id"))?;
        info!(%post_id, "published");
        Ok(post_id)
    }
}

// ---------------------------------------------------------------------------
// Instagram feed
// ---------------------------------------------------------------------------

pub struct InstagramFeedPublisher {
    graph: Arc<GraphClient>,
    target: Target,
    account_id: String,
}

impl InstagramFeedPublisher {
    pub fn new(graph: Arc<GraphClient>, account_id: String) -> Self {
        Self {
            graph,
            target: Target {
                platform: Platform::InstagramFeed,
                account_id: Some(account_id.clone()),
            },
            account_id,
        }
    }
}

#[async_trait]
impl SocialPublisher for InstagramFeedPublisher {
    fn target(&self) -> &Target {
        &self.target
    }

    #[instrument(skip_all, fields(target = %self.target))]
    async fn publish(
        &self,
        media_url: &PublicMediaUrl,
        caption: &Caption,
    ) -> std::result::Result<String, TargetError> {
        let container = self
            .graph
            .post(
                &format!("{}/media", self.account_id),
                &[("image_url", media_url.as_str()), ("caption", caption.text.as_str())],
            )
            .await?;
        let creation_id = str_field(&container, "id")?;
        debug!(state = ?TargetState::Submitted, %creation_id, "container created");

        let post_id = publish_container(&self.graph, &self.account_id, &creation_id).await?;
        info!(%post_id, "published");
        Ok(post_id)
    }
}

// ---------------------------------------------------------------------------
// Instagram Reels
// ---------------------------------------------------------------------------

/// Status-check budget for video containers.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            attempts: 20,
        }
    }
}

pub struct InstagramReelsPublisher {
    graph: Arc<GraphClient>,
    target: Target,
    account_id: String,
    poll: PollPolicy,
}

impl InstagramReelsPublisher {
    pub fn new(graph: Arc<GraphClient>, account_id: String, poll: PollPolicy) -> Self {
        Self {
            graph,
            target: Target {
                platform: Platform::InstagramReels,
                account_id: Some(account_id.clone()),
            },
            account_id,
            poll,
        }
    }

    /// Poll until the container reports `FINISHED`. Every check, failed or
    /// not, consumes one attempt.
    async fn wait_until_ready(&self, creation_id: &str) -> std::result::Result<(), TargetError> {
        for attempt in 1..=self.poll.attempts {
            tokio::time::sleep(self.poll.interval).await;

            let status = match self.graph.get(creation_id, &[("fields", "status_code")]).await {
                Ok(value) => str_field(&value, "status_code"),
                Err(e) => Err(e),
            };

            match status.as_deref() {
                Ok("FINISHED") => {
                    debug!(attempt, "processing finished");
                    return Ok(());
                }
                Ok(code @ ("ERROR" | "EXPIRED")) => {
                    return Err(TargetError::ProcessingFailed {
                        status_code: code.to_string(),
                    });
                }
                Ok(code) => {
                    debug!(attempt, state = ?TargetState::Processing, status_code = code, "still processing");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "status check failed");
                }
            }
        }

        Err(TargetError::ProcessingTimeout {
            attempts: self.poll.attempts,
        })
    }
}

#[async_trait]
impl SocialPublisher for InstagramReelsPublisher {
    fn target(&self) -> &Target {
        &self.target
    }

    #[instrument(skip_all, fields(target = %self.target))]
    async fn publish(
        &self,
        media_url: &PublicMediaUrl,
        caption: &Caption,
    ) -> std::result::Result<String, TargetError> {
        let container = self
            .graph
            .post(
                &format!("{}/media", self.account_id),
                &[
                    ("media_type", "REELS"),
                    ("video_url", media_url.as_str()),
                    ("caption", caption.text.as_str()),
                ],
            )
            .await?;
        let creation_id = str_field(&container, "id")?;
        debug!(state = ?TargetState::Submitted, %creation_id, "container created");

        self.wait_until_ready(&creation_id).await?;

        let post_id = publish_container(&self.graph, &self.account_id, &creation_id).await?;
        info!(%post_id, "published");
        Ok(post_id)
    }
}

async fn publish_container(
    graph: &GraphClient,
    account_id: &str,
    creation_id: &str,
) -> std::result::Result<String, TargetError> {
    let published = graph
        .post(
            &format!("{account_id}/media_publish"),
            &[("creation_id", creation_id)],
        )
        .await?;
    str_field(&published, "id")
}
