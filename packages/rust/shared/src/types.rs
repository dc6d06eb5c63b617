//! Core domain types for a publication run.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one pipeline run (time-sortable, log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// Opaque CMS identifier of the article a webhook named.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleRef(String);

impl ArticleRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the creative's source image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// The article's featured media.
    Featured,
    /// The configured brand default (no featured media, or it did not resolve).
    BrandDefault,
}

/// Article metadata as fetched from the CMS, markup already stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleContent {
    pub title: String,
    pub summary: String,
    pub body: String,
    /// Never empty: falls back to the brand default image.
    pub featured_image_url: String,
    pub image_source: ImageSource,
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Pure input to the asset renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub source_image_url: String,
    pub title: String,
    pub brand_logo_url: String,
}

/// Encoded creative bytes. Owned by the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl RenderedAsset {
    /// File extension matching the mime type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "video/mp4" => "mp4",
            _ => "bin",
        }
    }
}

// ---------------------------------------------------------------------------
// Caption
// ---------------------------------------------------------------------------

/// Which path produced a caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionOrigin {
    Generated,
    Fallback,
}

/// Final post text handed to every fan-out target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub text: String,
    pub origin: CaptionOrigin,
}

// ---------------------------------------------------------------------------
// Media URL
// ---------------------------------------------------------------------------

/// Publicly reachable URL of the uploaded creative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicMediaUrl(String);

impl PublicMediaUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicMediaUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Platform adapter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Facebook page photo post.
    FacebookPage,
    /// Instagram feed image post.
    InstagramFeed,
    /// Instagram Reels (asynchronous video processing).
    InstagramReels,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FacebookPage => "facebook_page",
            Self::InstagramFeed => "instagram_feed",
            Self::InstagramReels => "instagram_reels",
        }
    }

    /// Whether the platform needs a processing poll before publishing.
    pub fn is_video(&self) -> bool {
        matches!(self, Self::InstagramReels)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (platform, account) pair. The account is `None` when its credential
/// was not configured, which makes the target `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub platform: Platform,
    pub account_id: Option<String>,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account_id {
            Some(id) => write!(f, "{}:{id}", self.platform),
            None => write!(f, "{}:<unset>", self.platform),
        }
    }
}

/// Per-target state machine.
///
/// `Skipped`, `Published` and `Failed` are terminal; every recorded
/// [`PublishOutcome`] carries a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetState {
    Skipped,
    Submitted,
    Processing,
    Published,
    Failed,
}

impl TargetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Published | Self::Failed)
    }
}

/// Result of publishing to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub target: Target,
    pub state: TargetState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PublishOutcome {
    pub fn published(target: Target, post_id: String) -> Self {
        Self {
            target,
            state: TargetState::Published,
            post_id: Some(post_id),
            detail: None,
        }
    }

    pub fn failed(target: Target, detail: impl Into<String>) -> Self {
        Self {
            target,
            state: TargetState::Failed,
            post_id: None,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(target: Target, reason: impl Into<String>) -> Self {
        Self {
            target,
            state: TargetState::Skipped,
            post_id: None,
            detail: Some(reason.into()),
        }
    }

    pub fn success(&self) -> bool {
        self.state == TargetState::Published
    }
}

/// Aggregated result of a run that reached fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub post_id: String,
    pub media_url: PublicMediaUrl,
    pub caption_origin: CaptionOrigin,
    pub outcomes: Vec<PublishOutcome>,
    /// True when ANY outcome reached `Published`.
    pub overall: bool,
}

impl PipelineResult {
    pub fn new(
        post_id: impl Into<String>,
        media_url: PublicMediaUrl,
        caption_origin: CaptionOrigin,
        outcomes: Vec<PublishOutcome>,
    ) -> Self {
        let overall = outcomes.iter().any(PublishOutcome::success);
        Self {
            post_id: post_id.into(),
            media_url,
            caption_origin,
            outcomes,
            overall,
        }
    }

    /// Outcomes that did not publish (failed or skipped).
    pub fn unpublished(&self) -> impl Iterator<Item = &PublishOutcome> {
        self.outcomes.iter().filter(|o| !o.success())
    }

    /// Overall success with at least one target left behind.
    pub fn is_partial(&self) -> bool {
        self.overall && self.unpublished().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(platform: Platform, id: &str) -> Target {
        Target {
            platform,
            account_id: Some(id.into()),
        }
    }

    #[test]
    fn run_id_is_time_sortable() {
        let a = RunId::new();
        let b = RunId::new();
        assert!(a.0 <= b.0);
    }

    #[test]
    fn overall_is_any_published() {
        let outcomes = vec![
            PublishOutcome::published(target(Platform::FacebookPage, "1"), "p1".into()),
            PublishOutcome::failed(target(Platform::InstagramFeed, "2"), "HTTP 400"),
        ];
        let result = PipelineResult::new(
            "42",
            PublicMediaUrl::new("https://host/x.png"),
            CaptionOrigin::Fallback,
            outcomes,
        );
        assert!(result.overall);
        assert!(result.is_partial());
        assert_eq!(result.unpublished().count(), 1);
    }

    #[test]
    fn all_skipped_is_not_overall() {
        let skipped = Target {
            platform: Platform::InstagramFeed,
            account_id: None,
        };
        let result = PipelineResult::new(
            "42",
            PublicMediaUrl::new("https://host/x.png"),
            CaptionOrigin::Generated,
            vec![PublishOutcome::skipped(skipped, "no account id")],
        );
        assert!(!result.overall);
        assert!(!result.is_partial());
    }

    #[test]
    fn target_display() {
        assert_eq!(
            target(Platform::InstagramReels, "17841").to_string(),
            "instagram_reels:17841"
        );
        let unset = Target {
            platform: Platform::FacebookPage,
            account_id: None,
        };
        assert_eq!(unset.to_string(), "facebook_page:<unset>");
    }

    #[test]
    fn outcome_serializes_terminal_state() {
        let outcome =
            PublishOutcome::published(target(Platform::FacebookPage, "1"), "99".into());
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains(r#""state":"PUBLISHED""#));
        assert!(!json.contains("detail"));
        assert!(outcome.state.is_terminal());
        assert!(!TargetState::Processing.is_terminal());
    }

    #[test]
    fn asset_extension_follows_mime() {
        let asset = RenderedAsset {
            bytes: vec![],
            mime_type: "image/jpeg".into(),
        };
        assert_eq!(asset.extension(), "jpg");
    }
}
