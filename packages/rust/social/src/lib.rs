//! Media hosting and social fan-out.
//!
//! - [`MediaHost`] turns rendered bytes into a public URL ([`WordPressMediaHost`])
//! - [`SocialPublisher`] posts that URL and a caption to one account
//! - [`FanOut`] drives every configured publisher and aggregates outcomes

mod fanout;
mod graph;
mod host;
mod publishers;

pub use fanout::{FanOut, TargetSlot, ensure_targets};
pub use graph::GraphClient;
pub use host::{MediaHost, WordPressMediaHost, asset_filename};
pub use publishers::{
    FacebookPagePublisher, InstagramFeedPublisher, InstagramReelsPublisher, PollPolicy,
    SocialPublisher,
};

/// User-Agent string for outbound requests.
pub(crate) const USER_AGENT: &str = concat!("postrelay/", env!("CARGO_PKG_VERSION"));
