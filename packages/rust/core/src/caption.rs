//! Caption composition.
//!
//! The primary path asks an OpenAI-compatible chat endpoint for a caption and
//! a hashtag set. Any failure (transport, status, timeout, unparsable reply)
//! falls back to a deterministic template built from the article itself, so
//! [`CaptionComposer::compose`] never fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use postrelay_shared::{
    ArticleContent, BrandConfig, Caption, CaptionOrigin, CaptionSettings, PostRelayError, Result,
    Settings,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

/// User-Agent string for caption requests.
const USER_AGENT: &str = concat!("postrelay/", env!("CARGO_PKG_VERSION"));

/// Upper bound on article body bytes sent to the generator.
const MAX_BODY_BYTES: usize = 4000;

const INSTRUCTIONS: &str = "\
Você é o editor de redes sociais de um portal de notícias regional. \
Escreva uma legenda curta e informativa para Instagram e Facebook sobre a matéria abaixo, \
sem inventar fatos, terminando com um convite para ler a matéria completa pelo link na bio. \
Sugira de 3 a 6 hashtags relevantes. \
Responda apenas com JSON no formato {\"caption\": \"...\", \"hashtags\": [\"#...\"]}.";

/// Produces the post text for a run. Never fails.
#[async_trait]
pub trait CaptionComposer: Send + Sync {
    async fn compose(&self, article: &ArticleContent) -> Caption;
}

// ---------------------------------------------------------------------------
// Fallback template
// ---------------------------------------------------------------------------

/// Fixed parts of the fallback caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTemplate {
    pub cta: String,
    pub hashtags: Vec<String>,
}

impl CaptionTemplate {
    pub fn from_brand(brand: &BrandConfig) -> Self {
        Self {
            cta: brand.cta.clone(),
            hashtags: brand.hashtags.clone(),
        }
    }
}

/// `title`, `summary`, CTA and default hashtags separated by blank lines.
/// Empty parts are left out.
pub fn fallback_caption(article: &ArticleContent, template: &CaptionTemplate) -> Caption {
    let tags = template.hashtags.join(" ");
    let text = [
        article.title.trim(),
        article.summary.trim(),
        template.cta.trim(),
        tags.trim(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("\n\n");

    Caption {
        text,
        origin: CaptionOrigin::Fallback,
    }
}

/// Composer used when no generator endpoint is configured.
pub struct TemplateCaptioner {
    template: CaptionTemplate,
}

impl TemplateCaptioner {
    pub fn new(template: CaptionTemplate) -> Self {
        Self { template }
    }
}

#[async_trait]
impl CaptionComposer for TemplateCaptioner {
    async fn compose(&self, article: &ArticleContent) -> Caption {
        fallback_caption(article, &self.template)
    }
}

// ---------------------------------------------------------------------------
// Generative composer
// ---------------------------------------------------------------------------

/// Composer backed by an OpenAI-compatible `chat/completions` endpoint.
pub struct GenerativeCaptioner {
    client: Client,
    endpoint: String,
    model: String,
    token: Option<String>,
    template: CaptionTemplate,
}

impl GenerativeCaptioner {
    pub fn new(
        endpoint: String,
        model: String,
        token: Option<String>,
        timeout: Duration,
        template: CaptionTemplate,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PostRelayError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model,
            token,
            template,
        })
    }

    async fn request(&self, article: &ArticleContent) -> std::result::Result<Caption, String> {
        let body = truncate_to_char_boundary(&article.body, MAX_BODY_BYTES);
        let payload = json!({
            "model": self.model,
            "temperature": 0.7,
            "messages": [
                { "role": "system", "content": INSTRUCTIONS },
                {
                    "role": "user",
                    "content": format!(
                        "Título: {}\n\nResumo: {}\n\nTexto: {}",
                        article.title, article.summary, body
                    )
                }
            ]
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        // a missing token still attempts the call; the endpoint decides
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let reply = message_content(&text);
        parse_generated(&reply)
            .map(|generated| generated.into_caption(&self.template))
            .ok_or_else(|| "reply did not contain a usable caption".to_string())
    }
}

#[async_trait]
impl CaptionComposer for GenerativeCaptioner {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn compose(&self, article: &ArticleContent) -> Caption {
        match self.request(article).await {
            Ok(caption) => {
                info!(chars = caption.text.chars().count(), "caption generated");
                caption
            }
            Err(reason) => {
                warn!(%reason, "caption generation failed, using fallback");
                fallback_caption(article, &self.template)
            }
        }
    }
}

/// Pick the composer for the resolved settings.
pub fn composer_from_settings(settings: &Settings) -> Result<Arc<dyn CaptionComposer>> {
    let template = CaptionTemplate::from_brand(&settings.brand);
    let CaptionSettings {
        endpoint,
        model,
        token,
        timeout,
    } = &settings.caption;

    match endpoint {
        Some(endpoint) => {
            if token.is_none() {
                debug!("caption token not set, requests go out unauthenticated");
            }
            Ok(Arc::new(GenerativeCaptioner::new(
                endpoint.clone(),
                model.clone(),
                token.clone(),
                *timeout,
                template,
            )?))
        }
        None => Ok(Arc::new(TemplateCaptioner::new(template))),
    }
}

// ---------------------------------------------------------------------------
// Reply parsing (untrusted input)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GeneratedCaption {
    #[serde(alias = "legenda")]
    caption: String,
    #[serde(default)]
    hashtags: Option<Hashtags>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Hashtags {
    List(Vec<String>),
    Joined(String),
}

impl GeneratedCaption {
    fn into_caption(self, template: &CaptionTemplate) -> Caption {
        let tags: Vec<String> = match self.hashtags {
            Some(Hashtags::List(list)) => list,
            Some(Hashtags::Joined(joined)) => {
                joined.split_whitespace().map(String::from).collect()
            }
            None => Vec::new(),
        }
        .iter()
        .map(|t| normalize_tag(t))
        .filter(|t| t.len() > 1)
        .collect();

        let tags = if tags.is_empty() {
            template.hashtags.join(" ")
        } else {
            tags.join(" ")
        };

        Caption {
            text: format!("{}\n\n{tags}", self.caption.trim()),
            origin: CaptionOrigin::Generated,
        }
    }
}

/// The chat `choices[0].message.content` string, or the raw reply when it
/// is not a chat completion envelope.
fn message_content(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| {
            v.pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| raw.to_string())
}

/// Parse the first `{` … last `}` span of `reply`.
fn parse_generated(reply: &str) -> Option<GeneratedCaption> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }

    let generated: GeneratedCaption = serde_json::from_str(&reply[start..=end]).ok()?;
    (!generated.caption.trim().is_empty()).then_some(generated)
}

fn normalize_tag(tag: &str) -> String {
    let bare = tag.trim().trim_start_matches('#').replace(char::is_whitespace, "");
    format!("#{bare}")
}

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}
