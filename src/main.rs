use anyhow::Context as _;
use clap::Parser;
use fetchcache::CacheContext;
use fetchcache::config::{CacheConfig, DEFAULT_LOG_FILTER};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Preload URLs into a fresh cache and print the handoff payload
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URLs to fetch before serializing
    #[arg(required = true)]
    urls: Vec<String>,

    /// Write the payload to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Custom user agent for outbound requests
    #[arg(long)]
    user_agent: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = CacheConfig::default();
    if let Some(user_agent) = args.user_agent {
        config = config.with_user_agent(user_agent);
    }

    let context = CacheContext::http(&config)?;

    for (url, result) in context.preload_all(args.urls).await {
        if let Err(e) = result {
            // The failure is part of the payload; keep going
            error!("Preload failed for {}: {}", url, e);
        }
    }

    let payload = context.serialize()?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &payload)
                .with_context(|| format!("writing payload to {}", path.display()))?;
            info!("Wrote {} bytes to {}", payload.len(), path.display());
        }
        None => println!("{payload}"),
    }

    Ok(())
}
