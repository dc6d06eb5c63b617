//! Shared types, error model, and configuration for postrelay.
//!
//! This crate is the foundation depended on by all other postrelay crates.
//! It provides:
//! - [`PostRelayError`] and the per-stage error types
//! - Domain types ([`ArticleContent`], [`RenderedAsset`], [`Target`], [`PipelineResult`])
//! - Configuration ([`AppConfig`], [`Settings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrandConfig, CaptionConfig, CaptionSettings, CmsConfig, CmsSettings,
    CreativeFormat, DedupBackend, DedupConfig, ServerConfig, Settings, SocialConfig,
    SocialSettings, TargetConfig, Timeouts, TimeoutsConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{FetchError, MediaPublishError, PostRelayError, RenderError, Result, TargetError};
pub use types::{
    ArticleContent, ArticleRef, Caption, CaptionOrigin, ImageSource, Platform, PipelineResult,
    PublicMediaUrl, PublishOutcome, RenderRequest, RenderedAsset, RunId, Target, TargetState,
};
