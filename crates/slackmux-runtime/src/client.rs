//! `slackmux health`: query a running bridge.

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::cli::HealthOpts;

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub mappings: usize,
    pub records: usize,
    pub uptime: f64,
}

impl HealthResponse {
    pub fn summary(&self) -> String {
        format!(
            "{}  bindings={}  records={}  uptime={}",
            if self.ok { "ok" } else { "degraded" },
            self.mappings,
            self.records,
            format_uptime(self.uptime)
        )
    }
}

pub async fn cmd_health(opts: &HealthOpts) -> anyhow::Result<()> {
    let url = format!("http://{}:{}/health", opts.host, opts.port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?;
    let body = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("bridge not reachable at {url}"))?
        .error_for_status()?
        .text()
        .await?;

    if opts.json {
        println!("{body}");
        return Ok(());
    }
    let health: HealthResponse =
        serde_json::from_str(&body).context("unexpected /health response")?;
    println!("{}", health.summary());
    Ok(())
}

fn format_uptime(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m{s:02}s"),
        (h, m, _) => format!("{h}h{m:02}m"),
    }
}
