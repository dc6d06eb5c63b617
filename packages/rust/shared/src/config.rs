//! Application configuration for postrelay.
//!
//! User config lives at `~/.postrelay/postrelay.toml`. The file never holds
//! secrets: it names the environment variables that do. At startup the file
//! is resolved once into an immutable [`Settings`] value that is handed to
//! each component constructor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PostRelayError, Result};
use crate::types::{Platform, Target};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "postrelay.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".postrelay";

// ---------------------------------------------------------------------------
// Config structs (matching postrelay.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cms: CmsConfig,

    #[serde(default)]
    pub brand: BrandConfig,

    #[serde(default)]
    pub caption: CaptionConfig,

    #[serde(default)]
    pub social: SocialConfig,

    /// Fan-out targets, published to in order.
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cms: CmsConfig::default(),
            brand: BrandConfig::default(),
            caption: CaptionConfig::default(),
            social: SocialConfig::default(),
            targets: default_targets(),
            dedup: DedupConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path the CMS posts webhooks to.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            webhook_path: default_webhook_path(),
        }
    }
}

fn default_port() -> u16 {
    10000
}
fn default_webhook_path() -> String {
    "/webhook-receiver".into()
}

/// `[cms]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    /// WordPress site root, e.g. `https://example.com`.
    #[serde(default)]
    pub base_url: String,

    /// Basic-auth user name.
    #[serde(default)]
    pub user: Option<String>,

    /// Name of the env var holding the application password.
    #[serde(default = "default_cms_password_env")]
    pub password_env: String,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user: None,
            password_env: default_cms_password_env(),
        }
    }
}

fn default_cms_password_env() -> String {
    "WP_PASSWORD".into()
}

/// Creative shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativeFormat {
    /// 1080×1080 feed creative.
    Square,
    /// 1080×1920 short-form creative.
    Tall,
}

impl CreativeFormat {
    /// Whether the renderer emits a video container for this format.
    pub fn is_video(&self) -> bool {
        match self {
            Self::Square | Self::Tall => false,
        }
    }
}

/// `[brand]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    /// Image used when an article has no usable featured media.
    #[serde(default)]
    pub default_image_url: String,

    /// Logo composited onto every creative.
    #[serde(default)]
    pub logo_url: String,

    /// Footer text rendered at the bottom of the creative.
    #[serde(default = "default_footer")]
    pub footer: String,

    /// Call-to-action line of the fallback caption.
    #[serde(default = "default_cta")]
    pub cta: String,

    /// Hashtags appended to the fallback caption.
    #[serde(default = "default_hashtags")]
    pub hashtags: Vec<String>,

    #[serde(default = "default_format")]
    pub format: CreativeFormat,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            default_image_url: String::new(),
            logo_url: String::new(),
            footer: default_footer(),
            cta: default_cta(),
            hashtags: default_hashtags(),
            format: default_format(),
        }
    }
}

fn default_footer() -> String {
    "@VOZDOLITORALNORTE".into()
}
fn default_cta() -> String {
    "Leia a matéria completa em nosso site. Link na bio!".into()
}
fn default_hashtags() -> Vec<String> {
    ["#noticias", "#litoralnorte", "#brasil", "#jornalismo"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_format() -> CreativeFormat {
    CreativeFormat::Square
}

/// `[caption]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// OpenAI-compatible chat completions endpoint. Unset means every
    /// caption uses the fallback template.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_caption_model")]
    pub model: String,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_caption_token_env")]
    pub token_env: String,

    #[serde(default = "default_caption_timeout")]
    pub timeout_secs: u64,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_caption_model(),
            token_env: default_caption_token_env(),
            timeout_secs: default_caption_timeout(),
        }
    }
}

fn default_caption_model() -> String {
    "gpt-4o-mini".into()
}
fn default_caption_token_env() -> String {
    "CAPTION_API_TOKEN".into()
}
fn default_caption_timeout() -> u64 {
    20
}

/// `[social]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Name of the env var holding the long-lived page access token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Seconds between video processing status checks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Status checks before a video target fails with a processing timeout.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            graph_base_url: default_graph_base_url(),
            api_version: default_api_version(),
            access_token_env: default_access_token_env(),
            poll_interval_secs: default_poll_interval(),
            poll_attempts: default_poll_attempts(),
        }
    }
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".into()
}
fn default_api_version() -> String {
    "v19.0".into()
}
fn default_access_token_env() -> String {
    "META_API_TOKEN".into()
}
fn default_poll_interval() -> u64 {
    5
}
fn default_poll_attempts() -> u32 {
    20
}

/// `[[targets]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub platform: Platform,

    /// Literal account id. Takes precedence over `account_id_env`.
    #[serde(default)]
    pub account_id: Option<String>,

    /// Name of the env var holding the account id.
    #[serde(default)]
    pub account_id_env: Option<String>,
}

fn default_targets() -> Vec<TargetConfig> {
    vec![
        TargetConfig {
            platform: Platform::InstagramFeed,
            account_id: None,
            account_id_env: Some("INSTAGRAM_ID".into()),
        },
        TargetConfig {
            platform: Platform::FacebookPage,
            account_id: None,
            account_id_env: Some("FACEBOOK_PAGE_ID".into()),
        },
    ]
}

/// Dedup backing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupBackend {
    /// Bounded in-memory recency window.
    Memory,
    /// libSQL database with per-id expiry.
    Libsql,
}

/// `[dedup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_backend")]
    pub backend: DedupBackend,

    /// Ids remembered by the in-memory window.
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,

    /// Retention of each id in the durable store.
    #[serde(default = "default_dedup_ttl_hours")]
    pub ttl_hours: u64,

    /// Database file for the libSQL backend (defaults to `~/.postrelay/dedup.db`).
    #[serde(default)]
    pub database: Option<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            backend: default_dedup_backend(),
            capacity: default_dedup_capacity(),
            ttl_hours: default_dedup_ttl_hours(),
            database: None,
        }
    }
}

fn default_dedup_backend() -> DedupBackend {
    DedupBackend::Memory
}
fn default_dedup_capacity() -> usize {
    50
}
fn default_dedup_ttl_hours() -> u64 {
    24
}

/// `[timeouts]` section, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_fetch_timeout")]
    pub fetch_secs: u64,
    #[serde(default = "default_download_timeout")]
    pub download_secs: u64,
    #[serde(default = "default_upload_timeout")]
    pub upload_secs: u64,
    #[serde(default = "default_fanout_timeout")]
    pub fanout_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_timeout(),
            download_secs: default_download_timeout(),
            upload_secs: default_upload_timeout(),
            fanout_secs: default_fanout_timeout(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    15
}
fn default_download_timeout() -> u64 {
    15
}
fn default_upload_timeout() -> u64 {
    30
}
fn default_fanout_timeout() -> u64 {
    20
}

// ---------------------------------------------------------------------------
// Resolved settings (runtime, secrets read from the environment)
// ---------------------------------------------------------------------------

/// CMS access, shared by the content fetcher and the media host.
#[derive(Debug, Clone)]
pub struct CmsSettings {
    /// Site root without trailing slash.
    pub base_url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl CmsSettings {
    /// Basic-auth pair, when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptionSettings {
    pub endpoint: Option<String>,
    pub model: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SocialSettings {
    /// `<graph_base_url>/<api_version>` without trailing slash.
    pub api_root: String,
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Timeouts {
    pub fetch: Duration,
    pub download: Duration,
    pub upload: Duration,
    pub fanout: Duration,
}

/// Immutable runtime configuration, built once at process start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub cms: CmsSettings,
    pub brand: BrandConfig,
    pub caption: CaptionSettings,
    pub social: SocialSettings,
    /// Targets with account ids resolved; `None` means skipped.
    pub targets: Vec<Target>,
    pub dedup: DedupConfig,
    pub timeouts: Timeouts,
}

impl Settings {
    /// Resolve `config` against the process environment.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve `config`, reading secrets through `lookup`. Empty values count
    /// as unset.
    pub fn resolve_with(
        config: &AppConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = validate_url("cms.base_url", &config.cms.base_url)?;
        validate_url("brand.default_image_url", &config.brand.default_image_url)?;
        validate_url("brand.logo_url", &config.brand.logo_url)?;
        let graph_base = validate_url("social.graph_base_url", &config.social.graph_base_url)?;

        let cms = CmsSettings {
            base_url,
            user: config.cms.user.clone().filter(|u| !u.is_empty()),
            password: env(&config.cms.password_env),
        };
        if cms.credentials().is_none() {
            tracing::warn!(
                password_env = %config.cms.password_env,
                "CMS credentials incomplete; requests will be sent unauthenticated"
            );
        }

        let caption = CaptionSettings {
            endpoint: config.caption.endpoint.clone().filter(|e| !e.is_empty()),
            model: config.caption.model.clone(),
            token: env(&config.caption.token_env),
            timeout: Duration::from_secs(config.caption.timeout_secs),
        };

        let social = SocialSettings {
            api_root: format!(
                "{graph_base}/{}",
                config.social.api_version.trim_matches('/')
            ),
            access_token: env(&config.social.access_token_env),
            poll_interval: Duration::from_secs(config.social.poll_interval_secs),
            poll_attempts: config.social.poll_attempts,
        };

        // a video target cannot publish a still creative
        if let Some(t) = config
            .targets
            .iter()
            .find(|t| t.platform.is_video() && !config.brand.format.is_video())
        {
            return Err(PostRelayError::config(format!(
                "target {} needs a video creative, but brand.format {:?} renders a still image",
                t.platform.as_str(),
                config.brand.format
            )));
        }

        let targets = config
            .targets
            .iter()
            .map(|t| Target {
                platform: t.platform,
                account_id: t
                    .account_id
                    .clone()
                    .filter(|id| !id.trim().is_empty())
                    .or_else(|| t.account_id_env.as_deref().and_then(&env)),
            })
            .collect();

        Ok(Self {
            server: config.server.clone(),
            cms,
            brand: config.brand.clone(),
            caption,
            social,
            targets,
            dedup: config.dedup.clone(),
            timeouts: Timeouts {
                fetch: Duration::from_secs(config.timeouts.fetch_secs),
                download: Duration::from_secs(config.timeouts.download_secs),
                upload: Duration::from_secs(config.timeouts.upload_secs),
                fanout: Duration::from_secs(config.timeouts.fanout_secs),
            },
        })
    }
}

/// Parse a required absolute URL and return it without trailing slash.
fn validate_url(field: &str, value: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(PostRelayError::config(format!("{field} must be set")));
    }
    Url::parse(value)
        .map_err(|e| PostRelayError::config(format!("{field} is not a valid URL: {e}")))?;
    Ok(value.trim_end_matches('/').to_string())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.postrelay/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PostRelayError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.postrelay/postrelay.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PostRelayError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PostRelayError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PostRelayError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PostRelayError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PostRelayError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn minimal() -> AppConfig {
        toml::from_str(
            r#"
[cms]
base_url = "https://news.example.com/"
user = "bot"

[brand]
default_image_url = "https://news.example.com/default.jpg"
logo_url = "https://news.example.com/logo.png"
"#,
        )
        .expect("parse")
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("webhook_path"));
        assert!(toml_str.contains("META_API_TOKEN"));
        assert!(toml_str.contains("FACEBOOK_PAGE_ID"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.server.port, 10000);
        assert_eq!(parsed.dedup.capacity, 50);
        assert_eq!(parsed.social.poll_attempts, 20);
        assert_eq!(parsed.targets.len(), 2);
    }

    #[test]
    fn explicit_targets_replace_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[[targets]]
platform = "instagram_reels"
account_id = "17841"
"#,
        )
        .expect("parse");
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].platform, Platform::InstagramReels);
    }

    #[test]
    fn resolve_reads_secrets_from_lookup() {
        let settings = Settings::resolve_with(
            &minimal(),
            lookup(&[
                ("WP_PASSWORD", "app-pass"),
                ("META_API_TOKEN", "tok"),
                ("INSTAGRAM_ID", "17841"),
            ]),
        )
        .expect("resolve");

        assert_eq!(settings.cms.base_url, "https://news.example.com");
        assert_eq!(settings.cms.credentials(), Some(("bot", "app-pass")));
        assert_eq!(settings.social.access_token.as_deref(), Some("tok"));
        assert_eq!(settings.social.api_root, "https://graph.facebook.com/v19.0");
        assert_eq!(settings.targets[0].account_id.as_deref(), Some("17841"));
        // FACEBOOK_PAGE_ID unset → target kept with no account (skipped later)
        assert_eq!(settings.targets[1].account_id, None);
        assert_eq!(settings.timeouts.upload, Duration::from_secs(30));
    }

    #[test]
    fn empty_env_values_count_as_unset() {
        let settings =
            Settings::resolve_with(&minimal(), lookup(&[("META_API_TOKEN", "  ")]))
                .expect("resolve");
        assert!(settings.social.access_token.is_none());
    }

    #[test]
    fn missing_cms_url_is_config_error() {
        let mut config = minimal();
        config.cms.base_url.clear();
        let err = Settings::resolve_with(&config, lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("cms.base_url must be set"));
    }

    #[test]
    fn video_target_with_still_creative_is_config_error() {
        let mut config = minimal();
        config.targets.push(TargetConfig {
            platform: Platform::InstagramReels,
            account_id: Some("17841".into()),
            account_id_env: None,
        });
        config.brand.format = CreativeFormat::Tall;

        let err = Settings::resolve_with(&config, lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("instagram_reels needs a video creative"));
    }

    #[test]
    fn invalid_logo_url_is_config_error() {
        let mut config = minimal();
        config.brand.logo_url = "not a url".into();
        let err = Settings::resolve_with(&config, lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("brand.logo_url"));
    }
}
