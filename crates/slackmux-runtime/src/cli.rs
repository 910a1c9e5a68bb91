//! CLI definition using clap derive. Every serve option has an env fallback.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use slackmux_core::pane_map::SWEEP_INTERVAL_SECS;
use slackmux_tmux::DEFAULT_TAG_OPTION;

pub const DEFAULT_PORT: u16 = 7890;
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Parser)]
#[command(name = "slackmux", version, about = "Relay Slack threads to tmux panes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the bridge (HTTP API + Slack Socket Mode listener)
    Serve(ServeOpts),
    /// Query a running bridge
    Health(HealthOpts),
}

#[derive(clap::Args, Debug)]
pub struct ServeOpts {
    /// Bot token (xoxb-...) used for chat.postMessage
    #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// App-level token (xapp-...) used to open Socket Mode connections
    #[arg(long, env = "SLACK_APP_TOKEN", hide_env_values = true)]
    pub app_token: String,

    /// Channel where session threads are created
    #[arg(long, env = "SLACK_CHANNEL_ID")]
    pub channel_id: String,

    #[arg(long, env = "BRIDGE_HOST", default_value_t = DEFAULT_HOST)]
    pub host: IpAddr,

    #[arg(long, env = "BRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Live bindings older than this are dropped
    #[arg(long, env = "MAPPING_TTL_MS", default_value_t = 86_400_000)]
    pub mapping_ttl_ms: u64,

    /// tmux session scanned for live panes at startup
    #[arg(long, env = "SLACKMUX_SESSION", default_value = "claudespace")]
    pub session: String,

    /// Pane user option carrying `claude:<name>`
    #[arg(long, env = "SLACKMUX_PANE_TAG", default_value = DEFAULT_TAG_OPTION)]
    pub pane_tag: String,

    #[arg(long, env = "SLACKMUX_THREAD_MAP", default_value = "data/thread-map.json")]
    pub thread_map: PathBuf,

    /// tmux socket path (-S)
    #[arg(long, env = "SLACKMUX_TMUX_SOCKET")]
    pub tmux_socket: Option<String>,

    #[arg(long, env = "SLACKMUX_TMUX_TIMEOUT_MS", default_value_t = 5000)]
    pub tmux_timeout_ms: u64,

    #[arg(long, env = "SLACKMUX_SWEEP_INTERVAL_SECS", default_value_t = SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,

    /// Keep the thread map in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Do not re-bind live tagged panes at startup
    #[arg(long)]
    pub no_restore: bool,
}

impl ServeOpts {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (flag, value) in [
            ("--bot-token", &self.bot_token),
            ("--app-token", &self.app_token),
            ("--channel-id", &self.channel_id),
            ("--session", &self.session),
            ("--pane-tag", &self.pane_tag),
        ] {
            if value.trim().is_empty() {
                bail!("{flag} must not be empty");
            }
        }
        if self.tmux_timeout_ms == 0 {
            bail!("--tmux-timeout-ms must be greater than 0");
        }
        if self.sweep_interval_secs == 0 {
            bail!("--sweep-interval-secs must be greater than 0");
        }
        self.mapping_ttl()?;
        Ok(())
    }

    pub fn mapping_ttl(&self) -> anyhow::Result<chrono::Duration> {
        if self.mapping_ttl_ms == 0 {
            bail!("--mapping-ttl-ms must be greater than 0");
        }
        i64::try_from(self.mapping_ttl_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .context("--mapping-ttl-ms is out of range")
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn tmux_timeout(&self) -> Duration {
        Duration::from_millis(self.tmux_timeout_ms)
    }
}

#[derive(clap::Args, Debug)]
pub struct HealthOpts {
    #[arg(long, env = "BRIDGE_HOST", default_value_t = DEFAULT_HOST)]
    pub host: IpAddr,

    #[arg(long, env = "BRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Print the raw JSON response
    #[arg(long)]
    pub json: bool,
}
