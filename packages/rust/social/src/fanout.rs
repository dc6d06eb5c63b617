//! Fan-out of one media URL and caption to every configured target.

use std::sync::Arc;

use futures::future::join_all;
use postrelay_shared::{
    Caption, Platform, PostRelayError, PublicMediaUrl, PublishOutcome, Result, Settings, Target,
};
use tracing::{info, instrument, warn};

use crate::graph::GraphClient;
use crate::publishers::{
    FacebookPagePublisher, InstagramFeedPublisher, InstagramReelsPublisher, PollPolicy,
    SocialPublisher,
};

/// One configured target, either ready to publish or skipped up front.
pub enum TargetSlot {
    Ready(Box<dyn SocialPublisher>),
    Skipped { target: Target, reason: String },
}

impl TargetSlot {
    pub fn target(&self) -> &Target {
        match self {
            Self::Ready(p) => p.target(),
            Self::Skipped { target, .. } => target,
        }
    }
}

/// Publishes to every slot independently and collects one outcome per slot.
#[derive(Default)]
pub struct FanOut {
    slots: Vec<TargetSlot>,
}

impl FanOut {
    pub fn new(slots: Vec<TargetSlot>) -> Self {
        Self { slots }
    }

    /// Build publishers for the resolved targets. A target without an
    /// account id, or every target when the access token is missing, is
    /// recorded as skipped.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let graph = match &settings.social.access_token {
            Some(token) => Some(Arc::new(GraphClient::new(
                settings.social.api_root.clone(),
                token.clone(),
                settings.timeouts.fanout,
            )?)),
            None => None,
        };
        let poll = PollPolicy {
            interval: settings.social.poll_interval,
            attempts: settings.social.poll_attempts,
        };

        let slots = settings
            .targets
            .iter()
            .map(|target| slot_for(target, graph.as_ref(), poll))
            .collect();
        Ok(Self { slots })
    }

    pub fn slots(&self) -> &[TargetSlot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Attempt every target concurrently. Never fails: target errors are
    /// recorded in the outcome, in configuration order.
    #[instrument(skip_all, fields(targets = self.slots.len(), media_url = %media_url))]
    pub async fn publish_all(
        &self,
        media_url: &PublicMediaUrl,
        caption: &Caption,
    ) -> Vec<PublishOutcome> {
        let attempts = self.slots.iter().map(|slot| async move {
            match slot {
                TargetSlot::Skipped { target, reason } => {
                    info!(%target, %reason, "target skipped");
                    PublishOutcome::skipped(target.clone(), reason.clone())
                }
                TargetSlot::Ready(publisher) => {
                    let target = publisher.target().clone();
                    match publisher.publish(media_url, caption).await {
                        Ok(post_id) => PublishOutcome::published(target, post_id),
                        Err(e) => {
                            warn!(%target, error = %e, "target failed");
                            PublishOutcome::failed(target, e.to_string())
                        }
                    }
                }
            }
        });

        join_all(attempts).await
    }
}

fn slot_for(target: &Target, graph: Option<&Arc<GraphClient>>, poll: PollPolicy) -> TargetSlot {
    let skip = |reason: &str| TargetSlot::Skipped {
        target: target.clone(),
        reason: reason.to_string(),
    };

    let Some(account_id) = target.account_id.clone() else {
        return skip("account id not configured");
    };
    let Some(graph) = graph.cloned() else {
        return skip("access token not configured");
    };

    let publisher: Box<dyn SocialPublisher> = match target.platform {
        Platform::FacebookPage => Box::new(FacebookPagePublisher::new(graph, account_id)),
        Platform::InstagramFeed => Box::new(InstagramFeedPublisher::new(graph, account_id)),
        Platform::InstagramReels => {
            Box::new(InstagramReelsPublisher::new(graph, account_id, poll))
        }
    };
    TargetSlot::Ready(publisher)
}

/// Error raised when no target could be built at all.
pub fn ensure_targets(fanout: &FanOut) -> Result<()> {
    if fanout.is_empty() {
        return Err(PostRelayError::config("no [[targets]] configured"));
    }
    Ok(())
}
