//! Core pipeline orchestration for postrelay.
//!
//! This crate ties the CMS fetcher, creative renderer, caption composer,
//! media host and social fan-out into one publication run per webhook
//! delivery, and exposes the HTTP router that triggers it.

pub mod caption;
pub mod pipeline;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use caption::{CaptionComposer, GenerativeCaptioner, TemplateCaptioner, fallback_caption};
pub use pipeline::{
    Pipeline, PipelineError, PipelineParts, ProgressReporter, RunReport, SilentProgress, Stage,
};
pub use webhook::{LIVENESS, parse_post_id, router};
