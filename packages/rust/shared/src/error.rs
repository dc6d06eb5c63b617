//! Error types for postrelay.
//!
//! Library crates use [`PostRelayError`] for setup and infrastructure failures
//! and the per-stage errors below for pipeline failures, so the orchestrator
//! can tag each abort with the stage that produced it. The CLI wraps all of
//! them with `color-eyre`.

use std::path::PathBuf;

/// Top-level error type for setup and infrastructure operations.
#[derive(Debug, thiserror::Error)]
pub enum PostRelayError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTTP client construction or transport error outside a pipeline stage.
    #[error("network error: {0}")]
    Network(String),

    /// Payload or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Dedup database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PostRelayError>;

impl PostRelayError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage errors
// ---------------------------------------------------------------------------

/// Failure to resolve an article from the CMS.
///
/// Auth and connectivity failures are separate variants for observability,
/// but the pipeline aborts identically on all of them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The CMS rejected our credentials.
    #[error("CMS rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    /// No content entry exists for the id.
    #[error("article {id} not found")]
    NotFound { id: String },

    /// Transport failure or timeout.
    #[error("CMS unreachable: {0}")]
    Network(String),

    /// Any other non-success status.
    #[error("CMS returned HTTP {status}")]
    Upstream { status: u16 },

    /// The entry could not be decoded.
    #[error("malformed CMS response: {0}")]
    Malformed(String),
}

/// Failure to produce a creative.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// One of the two source downloads failed.
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    /// The downloaded inputs could not be composed.
    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Failure to upload a creative to the hosting sink.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaPublishError {
    #[error("upload transport failed: {0}")]
    Transport(String),

    #[error("hosting sink returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("hosting sink response had no public URL")]
    MissingUrl,
}

/// Failure of a single fan-out target. Never aborts sibling targets.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TargetError {
    #[error("request failed: {0}")]
    Transport(String),

    /// The platform API answered with an error. `body` is kept verbatim for
    /// diagnosing expired or under-scoped tokens.
    #[error("platform returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("platform response missing `{0}`")]
    MissingField(&'static str),

    #[error("media processing ended with status {status_code}")]
    ProcessingFailed { status_code: String },

    #[error("processing timeout after {attempts} status checks")]
    ProcessingTimeout { attempts: u32 },
}
