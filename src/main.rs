use chattail::config;
use chattail::discord;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serenity::http::Http;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chattail", version, about = "Tail your log files over chat")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "prod.conf")]
    config: PathBuf,

    /// Log at INFO level
    #[arg(short, long)]
    verbose: bool,

    /// Log at DEBUG level
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level()));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(path = %cli.config.display(), "loading configuration");
    let cfg = config::Config::load(&cli.config)
        .await
        .inspect_err(|e| tracing::error!(error = ?e, "startup failed"))?;
    let token = cfg
        .resolve_token()
        .inspect_err(|e| tracing::error!(error = ?e, "startup failed"))?;
    info!(
        contacts = cfg.contacts.len(),
        files = cfg.files.len(),
        "configuration loaded"
    );

    let http = Arc::new(Http::new(&token));
    let replier = Arc::new(discord::DiscordReplier::new(http));
    let adapter = Arc::new(chattail::build_adapter(&cfg, replier));

    discord::run(adapter, &token)
        .await
        .inspect_err(|e| tracing::error!(error = ?e, "connection failed"))
        .context("chattail stopped on a transport error")?;

    info!("shutdown complete");
    Ok(())
}
