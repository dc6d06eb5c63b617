//! CLI command definitions, routing, and tracing setup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use postrelay_core::{Pipeline, PipelineError, ProgressReporter, RunReport, Stage, router};
use postrelay_shared::{
    AppConfig, ArticleRef, PipelineResult, PublishOutcome, Settings, TargetState, init_config,
    load_config, load_config_from,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// postrelay: publish new CMS articles to social media.
#[derive(Parser)]
#[command(
    name = "postrelay",
    version,
    about = "Turn CMS publish webhooks into branded social media posts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.postrelay/postrelay.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve the webhook receiver and liveness route.
    Serve {
        /// Listen port (overrides [server].port).
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },

    /// Run the pipeline once for an article, from the terminal.
    Run {
        /// CMS post id.
        post_id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration (secrets are never printed).
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "postrelay=info",
        1 => "postrelay=debug",
        _ => "postrelay=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve { port } => cmd_serve(config_path, port).await,
        Command::Run { post_id } => cmd_run(config_path, &post_id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>, port: Option<u16>) -> Result<()> {
    let settings = Settings::resolve(&load(config_path)?)?;
    let port = port.unwrap_or(settings.server.port);

    let pipeline = Arc::new(Pipeline::from_settings(&settings).await?);
    let app = router(pipeline, &settings.server.webhook_path);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| eyre!("cannot bind {addr}: {e}"))?;

    info!(
        %addr,
        webhook_path = %settings.server.webhook_path,
        targets = settings.targets.len(),
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn cmd_run(config_path: Option<&Path>, post_id: &str) -> Result<()> {
    let id = post_id
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| eyre!("invalid post id '{post_id}': expected a positive integer"))?;
    let article = ArticleRef::new(id.to_string());

    let settings = Settings::resolve(&load(config_path)?)?;
    let pipeline = Pipeline::from_settings(&settings).await?;

    info!(post_id = %article, "running pipeline");
    let reporter = CliProgress::new();
    let result = pipeline.run(&article, &reporter).await;
    reporter.finish();

    match result {
        Ok(RunReport::Duplicate) => {
            println!("Post {article} was already published recently; nothing to do.");
            Ok(())
        }
        Ok(RunReport::Completed(result)) => {
            print_summary(&result);
            Ok(())
        }
        Err(PipelineError::FanoutTotalFailure(result)) => {
            print_summary(&result);
            Err(eyre!("no target published post {article}"))
        }
        Err(e) => Err(eyre!("[{}] {e}", e.stage())),
    }
}

fn print_summary(result: &PipelineResult) {
    println!();
    println!("  Post:     {}", result.post_id);
    println!("  Media:    {}", result.media_url);
    println!("  Caption:  {:?}", result.caption_origin);
    println!("  Targets:");
    for outcome in &result.outcomes {
        println!("    {}", outcome_line(outcome));
    }
    println!();
}

fn outcome_line(outcome: &PublishOutcome) -> String {
    let mark = match outcome.state {
        TargetState::Published => "ok  ",
        TargetState::Skipped => "skip",
        _ => "FAIL",
    };
    let tail = outcome
        .post_id
        .as_deref()
        .or(outcome.detail.as_deref())
        .unwrap_or("");
    format!("{mark} {:<28} {tail}", outcome.target.to_string())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        self.spinner.set_message(stage.label());
    }

    fn target_finished(&self, outcome: &PublishOutcome) {
        self.spinner.println(format!("  {}", outcome_line(outcome)));
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");

    // Report which secrets resolve, never their values.
    let set = |name: &str| {
        if std::env::var(name).is_ok_and(|v| !v.trim().is_empty()) {
            "set"
        } else {
            "unset"
        }
    };
    println!("# environment");
    println!("# {} = {}", config.cms.password_env, set(&config.cms.password_env));
    println!(
        "# {} = {}",
        config.social.access_token_env,
        set(&config.social.access_token_env)
    );
    println!("# {} = {}", config.caption.token_env, set(&config.caption.token_env));
    for target in &config.targets {
        if let Some(env) = &target.account_id_env {
            println!("# {env} = {} ({})", set(env), target.platform);
        }
    }

    match Settings::resolve(&config) {
        Ok(settings) => {
            let ready = settings
                .targets
                .iter()
                .filter(|t| t.account_id.is_some())
                .count();
            println!("# {ready}/{} targets have an account id", settings.targets.len());
        }
        Err(e) => println!("# not usable yet: {e}"),
    }
    Ok(())
}
