use anyhow::Result;
use banter::app;
use banter::config::{Config, Overrides};
use banter::routing::RouteOverride;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "banter")]
#[command(version)]
#[command(about = "Terminal chat for assistant endpoints", long_about = None)]
struct Cli {
    /// Assistant base URL, e.g. http://localhost:8000
    #[arg(long)]
    endpoint: Option<String>,

    /// Request timeout in seconds, both send modes
    #[arg(long)]
    timeout: Option<u64>,

    /// Pin the send mode instead of routing by message content
    #[arg(long, default_value = "auto")]
    mode: RouteOverride,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Configuration problems surface here, before the terminal is touched.
    let config = Config::load(Overrides {
        endpoint: cli.endpoint,
        timeout_secs: cli.timeout,
    })?;

    app::run(config, cli.mode).await
}
