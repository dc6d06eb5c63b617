//! WordPress content fetcher.
//!
//! Resolves an article id to its title, summary, body and featured image
//! through the WordPress REST API (`/wp-json/wp/v2/posts/{id}` and
//! `/wp-json/wp/v2/media/{id}`). Markup in rendered fields is stripped to
//! plain text. A featured image that is absent or does not resolve falls back
//! to the brand default image.

mod text;

use std::time::Duration;

use async_trait::async_trait;
use postrelay_shared::{
    ArticleContent, ArticleRef, CmsSettings, FetchError, ImageSource, PostRelayError, Result,
    Settings,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

pub use text::html_to_text;

/// User-Agent string for CMS requests.
const USER_AGENT: &str = concat!("postrelay/", env!("CARGO_PKG_VERSION"));

/// REST namespace under the site root.
const API_PREFIX: &str = "wp-json/wp/v2";

/// Source of article content for the pipeline.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `article`. Fails only when the article itself cannot be resolved.
    async fn fetch(&self, article: &ArticleRef) -> std::result::Result<ArticleContent, FetchError>;
}

// ---------------------------------------------------------------------------
// WordPress wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    excerpt: Rendered,
    #[serde(default)]
    content: Rendered,
    /// 0 when the post has no featured image.
    #[serde(default)]
    featured_media: u64,
}

#[derive(Debug, Deserialize)]
struct WpMedia {
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    media_details: Option<MediaDetails>,
}

#[derive(Debug, Deserialize)]
struct MediaDetails {
    #[serde(default)]
    sizes: Option<MediaSizes>,
}

#[derive(Debug, Deserialize)]
struct MediaSizes {
    #[serde(default)]
    full: Option<MediaSize>,
}

#[derive(Debug, Deserialize)]
struct MediaSize {
    #[serde(default)]
    source_url: Option<String>,
}

impl WpMedia {
    /// Prefer the "full" size variant, then the generic source field.
    fn best_url(self) -> Option<String> {
        let full = self
            .media_details
            .and_then(|d| d.sizes)
            .and_then(|s| s.full)
            .and_then(|f| f.source_url);
        full.or(self.source_url)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
    }
}

// ---------------------------------------------------------------------------
// WordPressClient
// ---------------------------------------------------------------------------

/// [`ContentFetcher`] backed by the WordPress REST API with basic auth.
pub struct WordPressClient {
    client: Client,
    cms: CmsSettings,
    default_image_url: String,
}

impl WordPressClient {
    /// Build a client for `cms` with the given request timeout.
    pub fn new(cms: CmsSettings, default_image_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PostRelayError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            cms,
            default_image_url,
        })
    }

    /// Build from resolved settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.cms.clone(),
            settings.brand.default_image_url.clone(),
            settings.timeouts.fetch,
        )
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}/{API_PREFIX}/{path}", self.cms.base_url);
        let req = self.client.get(url);
        match self.cms.credentials() {
            Some((user, password)) => req.basic_auth(user, Some(password)),
            None => req,
        }
    }

    async fn fetch_post(&self, article: &ArticleRef) -> std::result::Result<WpPost, FetchError> {
        let response = self
            .get(&format!("posts/{}", article.id()))
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {}
            s @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                return Err(FetchError::Auth { status: s.as_u16() });
            }
            StatusCode::NOT_FOUND => {
                return Err(FetchError::NotFound {
                    id: article.id().to_string(),
                });
            }
            s => return Err(FetchError::Upstream { status: s.as_u16() }),
        }

        response
            .json::<WpPost>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }

    /// Resolve a media id to a direct URL. Every failure here is recoverable.
    async fn resolve_media(&self, media_id: u64) -> std::result::Result<String, String> {
        let response = self
            .get(&format!("media/{media_id}"))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let media: WpMedia = response.json().await.map_err(|e| e.to_string())?;
        media.best_url().ok_or_else(|| "media has no source URL".to_string())
    }
}

#[async_trait]
impl ContentFetcher for WordPressClient {
    #[instrument(skip_all, fields(post_id = %article))]
    async fn fetch(&self, article: &ArticleRef) -> std::result::Result<ArticleContent, FetchError> {
        let post = self.fetch_post(article).await?;

        let (featured_image_url, image_source) = if post.featured_media == 0 {
            debug!("post has no featured media, using brand default");
            (self.default_image_url.clone(), ImageSource::BrandDefault)
        } else {
            match self.resolve_media(post.featured_media).await {
                Ok(url) => (url, ImageSource::Featured),
                Err(reason) => {
                    warn!(
                        media_id = post.featured_media,
                        %reason,
                        "featured media did not resolve, using brand default"
                    );
                    (self.default_image_url.clone(), ImageSource::BrandDefault)
                }
            }
        };

        let content = ArticleContent {
            title: html_to_text(&post.title.rendered),
            summary: html_to_text(&post.excerpt.rendered),
            body: html_to_text(&post.content.rendered),
            featured_image_url,
            image_source,
        };

        info!(
            title = %content.title,
            image_source = ?content.image_source,
            "article fetched"
        );
        Ok(content)
    }
}
