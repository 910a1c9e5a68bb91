//! slackmux: relay between Slack threads and tmux panes.
//! Single-process binary: HTTP API for pane hooks, Socket Mode listener for
//! thread replies, and the background sweeper.

use clap::Parser;

mod cli;
mod client;
mod daemon;
mod server;
mod slack;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Serve(opts) => {
            let filter = std::env::var("SLACKMUX_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!(version = env!("CARGO_PKG_VERSION"), "slackmux starting");
            daemon::run(opts).await?;
        }
        cli::Command::Health(opts) => {
            client::cmd_health(&opts).await?;
        }
    }

    Ok(())
}
