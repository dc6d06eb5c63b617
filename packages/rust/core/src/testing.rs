//! In-crate fakes for every pipeline collaborator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use postrelay_cms::ContentFetcher;
use postrelay_render::AssetRenderer;
use postrelay_shared::{
    ArticleContent, ArticleRef, BrandConfig, Caption, FetchError, ImageSource, MediaPublishError,
    Platform, PublicMediaUrl, RenderError, RenderRequest, RenderedAsset, Target, TargetError,
};
use postrelay_social::{FanOut, MediaHost, SocialPublisher, TargetSlot};
use postrelay_storage::{DedupStore, RecentWindow};

use crate::caption::{CaptionComposer, CaptionTemplate, TemplateCaptioner};
use crate::pipeline::{Pipeline, PipelineParts};

pub(crate) const LOGO_URL: &str = "https://news.example.com/logo.png";

pub(crate) fn featured() -> ArticleContent {
    ArticleContent {
        title: "Praia liberada para banho".into(),
        summary: "Cetesb atualiza boletim.".into(),
        body: "Texto.".into(),
        featured_image_url: "https://cdn.example.com/praia.jpg".into(),
        image_source: ImageSource::Featured,
    }
}

pub(crate) fn brand_default() -> ArticleContent {
    ArticleContent {
        featured_image_url: "https://news.example.com/default.jpg".into(),
        image_source: ImageSource::BrandDefault,
        ..featured()
    }
}

/// Shared counters observed by tests.
#[derive(Default, Clone)]
pub(crate) struct Calls {
    pub fetch_calls: Arc<AtomicUsize>,
    pub render_requests: Arc<Mutex<Vec<RenderRequest>>>,
    pub uploads: Arc<Mutex<Vec<String>>>,
    pub publish_calls: Arc<AtomicUsize>,
    pub captions: Arc<Mutex<Vec<String>>>,
}

/// Scripted collaborator results. `Default` is the happy path.
pub(crate) struct Fakes {
    pub fetch: Result<ArticleContent, FetchError>,
    pub render: Result<RenderedAsset, RenderError>,
    pub upload: Result<PublicMediaUrl, MediaPublishError>,
    /// (platform, account id, result). No account id means skipped.
    pub targets: Vec<(Platform, Option<&'static str>, Result<String, TargetError>)>,
    pub dedup: Arc<dyn DedupStore>,
    /// `None` uses the template composer.
    pub captioner: Option<Arc<dyn CaptionComposer>>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            fetch: Ok(featured()),
            render: Ok(RenderedAsset {
                bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
                mime_type: "image/jpeg".into(),
            }),
            upload: Ok(PublicMediaUrl::new(
                "https://news.example.com/wp-content/uploads/post_social_42.jpg",
            )),
            targets: vec![
                (Platform::InstagramFeed, Some("17841"), Ok("ig1".into())),
                (Platform::FacebookPage, Some("1001"), Ok("fb1".into())),
            ],
            dedup: Arc::new(RecentWindow::new(50)),
            captioner: None,
        }
    }
}

impl Fakes {
    pub fn build(self) -> (Pipeline, Calls) {
        let calls = Calls::default();

        let slots = self
            .targets
            .into_iter()
            .map(|(platform, account, result)| {
                let target = Target {
                    platform,
                    account_id: account.map(String::from),
                };
                if target.account_id.is_none() {
                    TargetSlot::Skipped {
                        target,
                        reason: "account id not configured".into(),
                    }
                } else {
                    TargetSlot::Ready(Box::new(ScriptedPublisher {
                        target,
                        result,
                        calls: calls.clone(),
                    }))
                }
            })
            .collect();

        let pipeline = Pipeline::new(PipelineParts {
            dedup: self.dedup,
            fetcher: Arc::new(ScriptedFetcher {
                result: self.fetch,
                calls: calls.clone(),
            }),
            renderer: Arc::new(ScriptedRenderer {
                result: self.render,
                calls: calls.clone(),
            }),
            captioner: self.captioner.unwrap_or_else(|| {
                Arc::new(TemplateCaptioner::new(CaptionTemplate::from_brand(
                    &BrandConfig::default(),
                )))
            }),
            media_host: Arc::new(ScriptedHost {
                result: self.upload,
                calls: calls.clone(),
            }),
            fanout: FanOut::new(slots),
            brand_logo_url: LOGO_URL.into(),
        });

        (pipeline, calls)
    }
}

struct ScriptedFetcher {
    result: Result<ArticleContent, FetchError>,
    calls: Calls,
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, _article: &ArticleRef) -> Result<ArticleContent, FetchError> {
        self.calls.fetch_calls.fetch_add(1, Ordering::SeqCst);
        // widen the race window for concurrent-delivery tests
        tokio::task::yield_now().await;
        self.result.clone()
    }
}

struct ScriptedRenderer {
    result: Result<RenderedAsset, RenderError>,
    calls: Calls,
}

#[async_trait]
impl AssetRenderer for ScriptedRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedAsset, RenderError> {
        self.calls
            .render_requests
            .lock()
            .unwrap()
            .push(request.clone());
        self.result.clone()
    }
}

struct ScriptedHost {
    result: Result<PublicMediaUrl, MediaPublishError>,
    calls: Calls,
}

#[async_trait]
impl MediaHost for ScriptedHost {
    async fn publish(
        &self,
        _asset: &RenderedAsset,
        filename: &str,
    ) -> Result<PublicMediaUrl, MediaPublishError> {
        self.calls.uploads.lock().unwrap().push(filename.to_string());
        self.result.clone()
    }
}

struct ScriptedPublisher {
    target: Target,
    result: Result<String, TargetError>,
    calls: Calls,
}

#[async_trait]
impl SocialPublisher for ScriptedPublisher {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn publish(
        &self,
        _media_url: &PublicMediaUrl,
        caption: &Caption,
    ) -> Result<String, TargetError> {
        self.calls.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.captions.lock().unwrap().push(caption.text.clone());
        self.result.clone()
    }
}
