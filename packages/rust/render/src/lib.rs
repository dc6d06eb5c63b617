//! Branded creative renderer.
//!
//! Downloads the article photo and the brand logo, then composes a fixed
//! layout (photo, accent frame, dark panel, logo, wrapped title, footer) as
//! an SVG document and rasterizes it to a JPEG. The SVG is the single source
//! of the geometry; only the JPEG leaves the crate. Apart from the two
//! downloads the renderer has no side effects.

mod layout;
mod raster;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use postrelay_shared::{
    CreativeFormat, PostRelayError, RenderError, RenderRequest, RenderedAsset, Result, Settings,
};
use reqwest::Client;
use resvg::usvg::fontdb;
use tracing::{debug, instrument};

pub use layout::{CreativeLayout, Rect, compose_svg, escape_xml, wrap_text};
pub use raster::{JPEG_QUALITY, embed_as_data_uri, image_mime, rasterize_jpeg};

/// User-Agent string for image downloads.
const USER_AGENT: &str = concat!("postrelay/", env!("CARGO_PKG_VERSION"));

/// Mime type of every creative this renderer emits.
pub const CREATIVE_MIME: &str = "image/jpeg";

/// Produces the encoded creative for a run.
#[async_trait]
pub trait AssetRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest)
    -> std::result::Result<RenderedAsset, RenderError>;
}

/// [`AssetRenderer`] emitting JPEG creatives rasterized from an SVG layout.
pub struct CreativeRenderer {
    client: Client,
    layout: CreativeLayout,
    footer: String,
    fonts: Arc<fontdb::Database>,
}

impl CreativeRenderer {
    pub fn new(format: CreativeFormat, footer: String, download_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(download_timeout)
            .build()
            .map_err(|e| PostRelayError::Network(format!("failed to build HTTP client: {e}")))?;

        let fonts = raster::system_fonts();
        debug!(faces = fonts.len(), "fonts loaded");

        Ok(Self {
            client,
            layout: CreativeLayout::for_format(format),
            footer,
            fonts,
        })
    }

    /// Build from resolved settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.brand.format,
            settings.brand.footer.clone(),
            settings.timeouts.download,
        )
    }

    pub fn layout(&self) -> &CreativeLayout {
        &self.layout
    }

    /// Download `url` and check that the body is an image.
    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, RenderError> {
        let fail = |reason: String| RenderError::Download {
            url: url.to_string(),
            reason,
        };

        if url.trim().is_empty() {
            return Err(fail("empty URL".into()));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }

        let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        if bytes.is_empty() {
            return Err(fail("empty body".into()));
        }

        // content-type headers from CDNs are unreliable; trust the bytes
        let mime = image_mime(&bytes)
            .ok_or_else(|| RenderError::Encode(format!("{url} is not a recognizable image")))?;

        debug!(url, mime, size = bytes.len(), "image downloaded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AssetRenderer for CreativeRenderer {
    #[instrument(skip_all, fields(source = %request.source_image_url))]
    async fn render(
        &self,
        request: &RenderRequest,
    ) -> std::result::Result<RenderedAsset, RenderError> {
        let (photo, logo) = tokio::join!(
            self.download(&request.source_image_url),
            self.download(&request.brand_logo_url),
        );
        let (photo, logo) = (photo?, logo?);

        let layout = self.layout.clone();
        let footer = self.footer.clone();
        let fonts = Arc::clone(&self.fonts);
        let request = request.clone();

        let jpeg = tokio::task::spawn_blocking(move || {
            let photo = embed_as_data_uri(&request.source_image_url, &photo)?;
            let logo = embed_as_data_uri(&request.brand_logo_url, &logo)?;
            let svg = compose_svg(&layout, &photo, &logo, &request.title, &footer);
            rasterize_jpeg(&svg, layout.width, layout.height, fonts)
        })
        .await
        .map_err(|e| RenderError::Encode(format!("render task failed: {e}")))??;

        debug!(size = jpeg.len(), "creative rendered");
        Ok(RenderedAsset {
            bytes: jpeg,
            mime_type: CREATIVE_MIME.to_string(),
        })
    }
}
