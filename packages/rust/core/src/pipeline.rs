//! Publication pipeline: webhook id → dedup → fetch → (render ∥ caption) →
//! upload → fan-out → aggregate.
//!
//! Each run is independent; only the dedup store is shared between runs.
//! Stages before fan-out abort the run with a [`PipelineError`] tagged with
//! the failing [`Stage`]. Fan-out failures are recovered per target, and the
//! run fails only when no target published.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use postrelay_cms::{ContentFetcher, WordPressClient};
use postrelay_render::{AssetRenderer, CreativeRenderer};
use postrelay_shared::{
    ArticleRef, FetchError, MediaPublishError, PipelineResult, PublishOutcome, RenderError,
    RenderRequest, Result, RunId, Settings,
};
use postrelay_social::{FanOut, MediaHost, WordPressMediaHost, asset_filename, ensure_targets};
use postrelay_storage::{DedupStore, open_dedup_store};

use crate::caption::{CaptionComposer, composer_from_settings};

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DedupCheck,
    ContentFetch,
    Render,
    MediaPublish,
    Fanout,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DedupCheck => "dedup_check",
            Self::ContentFetch => "content_fetch",
            Self::Render => "render",
            Self::MediaPublish => "media_publish",
            Self::Fanout => "fanout",
        }
    }

    /// Human-readable label for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DedupCheck => "Checking for duplicate delivery",
            Self::ContentFetch => "Fetching article",
            Self::Render => "Rendering creative and caption",
            Self::MediaPublish => "Uploading creative",
            Self::Fanout => "Publishing to social targets",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that aborted.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("content fetch failed: {0}")]
    ContentFetch(#[from] FetchError),

    #[error("creative rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("media upload failed: {0}")]
    MediaPublish(#[from] MediaPublishError),

    /// Every target failed or was skipped. Carries the per-target outcomes.
    #[error("no target published ({} attempted)", .0.outcomes.len())]
    FanoutTotalFailure(PipelineResult),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::ContentFetch(_) => Stage::ContentFetch,
            Self::Render(_) => Stage::Render,
            Self::MediaPublish(_) => Stage::MediaPublish,
            Self::FanoutTotalFailure(_) => Stage::Fanout,
        }
    }

    /// Response status token for the webhook caller.
    pub fn status_token(&self) -> &'static str {
        match self {
            Self::ContentFetch(_) => "erro_processamento_wp",
            Self::Render(_) => "erro_criacao_imagem",
            Self::MediaPublish(_) => "erro_upload_wordpress",
            Self::FanoutTotalFailure(_) => "erro_publicacao_redes",
        }
    }
}

/// A run that did not abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// The id was seen within the retention window; nothing ran.
    Duplicate,
    /// At least one target published.
    Completed(PipelineResult),
}

impl RunReport {
    pub fn status_token(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicado",
            Self::Completed(_) => "sucesso",
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a stage.
    fn stage(&self, stage: Stage);
    /// Called once per target after fan-out.
    fn target_finished(&self, outcome: &PublishOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn target_finished(&self, _outcome: &PublishOutcome) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Collaborators of a [`Pipeline`].
pub struct PipelineParts {
    pub dedup: Arc<dyn DedupStore>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub renderer: Arc<dyn AssetRenderer>,
    pub captioner: Arc<dyn CaptionComposer>,
    pub media_host: Arc<dyn MediaHost>,
    pub fanout: FanOut,
    pub brand_logo_url: String,
}

/// The orchestrator. Shared by every delivery handled by the process.
pub struct Pipeline {
    dedup: Arc<dyn DedupStore>,
    fetcher: Arc<dyn ContentFetcher>,
    renderer: Arc<dyn AssetRenderer>,
    captioner: Arc<dyn CaptionComposer>,
    media_host: Arc<dyn MediaHost>,
    fanout: FanOut,
    brand_logo_url: String,
}

impl Pipeline {
    pub fn new(parts: PipelineParts) -> Self {
        let PipelineParts {
            dedup,
            fetcher,
            renderer,
            captioner,
            media_host,
            fanout,
            brand_logo_url,
        } = parts;

        Self {
            dedup,
            fetcher,
            renderer,
            captioner,
            media_host,
            fanout,
            brand_logo_url,
        }
    }

    /// Wire the production collaborators from resolved settings.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let fanout = FanOut::from_settings(settings)?;
        ensure_targets(&fanout)?;

        let dedup = open_dedup_store(&settings.dedup).await;
        info!(backend = dedup.name(), "dedup store ready");

        Ok(Self::new(PipelineParts {
            dedup,
            fetcher: Arc::new(WordPressClient::from_settings(settings)?),
            renderer: Arc::new(CreativeRenderer::from_settings(settings)?),
            captioner: composer_from_settings(settings)?,
            media_host: Arc::new(WordPressMediaHost::new(
                settings.cms.clone(),
                settings.timeouts.upload,
            )?),
            fanout,
            brand_logo_url: settings.brand.logo_url.clone(),
        }))
    }

    pub fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    /// Run the pipeline once for `article`.
    ///
    /// 1. Dedup check (duplicates end here)
    /// 2. Fetch article content
    /// 3. Render creative while composing the caption
    /// 4. Upload creative to the media host
    /// 5. Fan out to every target and aggregate
    #[instrument(skip_all, fields(post_id = %article, run_id = %RunId::new()))]
    pub async fn run(
        &self,
        article: &ArticleRef,
        progress: &dyn ProgressReporter,
    ) -> std::result::Result<RunReport, PipelineError> {
        let start = Instant::now();

        // --- Stage 1: Dedup ---
        progress.stage(Stage::DedupCheck);
        if !self.dedup.admit(article.id()).await {
            info!(backend = self.dedup.name(), "duplicate delivery ignored");
            return Ok(RunReport::Duplicate);
        }

        // --- Stage 2: Content ---
        progress.stage(Stage::ContentFetch);
        let content = self.fetcher.fetch(article).await.inspect_err(|e| {
            warn!(stage = %Stage::ContentFetch, error = %e, "run aborted");
        })?;

        // --- Stage 3: Render ∥ caption ---
        progress.stage(Stage::Render);
        let request = RenderRequest {
            source_image_url: content.featured_image_url.clone(),
            title: content.title.clone(),
            brand_logo_url: self.brand_logo_url.clone(),
        };
        let (asset, caption) = tokio::join!(
            self.renderer.render(&request),
            self.captioner.compose(&content),
        );
        let asset = asset.inspect_err(|e| {
            warn!(stage = %Stage::Render, error = %e, "run aborted");
        })?;

        // --- Stage 4: Upload ---
        progress.stage(Stage::MediaPublish);
        let filename = asset_filename(article.id(), &asset);
        let media_url = self
            .media_host
            .publish(&asset, &filename)
            .await
            .inspect_err(|e| {
                warn!(stage = %Stage::MediaPublish, error = %e, "run aborted");
            })?;

        // --- Stage 5: Fan-out ---
        progress.stage(Stage::Fanout);
        let outcomes = self.fanout.publish_all(&media_url, &caption).await;
        for outcome in &outcomes {
            progress.target_finished(outcome);
        }

        let result = PipelineResult::new(article.id(), media_url, caption.origin, outcomes);
        let published = result.outcomes.iter().filter(|o| o.success()).count();

        if !result.overall {
            warn!(
                targets = result.outcomes.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "no target published"
            );
            return Err(PipelineError::FanoutTotalFailure(result));
        }

        if result.is_partial() {
            warn!(
                published,
                targets = result.outcomes.len(),
                "partial fan-out success"
            );
        }

        info!(
            published,
            targets = result.outcomes.len(),
            caption_origin = ?result.caption_origin,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run complete"
        );
        Ok(RunReport::Completed(result))
    }
}
