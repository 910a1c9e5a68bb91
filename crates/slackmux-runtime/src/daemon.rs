//! Daemon wiring: bridge state, startup reconnect, background tasks, HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use slackmux_bridge::{Bridge, ReplyRouter, spawn_sweeper};
use slackmux_core::{JsonFileSnapshot, MemorySnapshot, SnapshotStore, ThreadStore};
use slackmux_tmux::{TmuxCommandRunner, TmuxExecutor, list_tagged_panes};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::ServeOpts;
use crate::server;
use crate::slack::{self, SlackClient};

/// Inbound replies buffered between the Socket Mode listener and the router.
const INBOUND_QUEUE: usize = 256;

/// Run the bridge until ctrl-c or SIGTERM.
pub async fn run(opts: ServeOpts) -> anyhow::Result<()> {
    opts.validate()?;

    let snapshot: Box<dyn SnapshotStore> = if opts.ephemeral {
        tracing::warn!("ephemeral mode: thread map is not persisted");
        Box::new(MemorySnapshot::new())
    } else {
        tracing::info!(path = %opts.thread_map.display(), "using thread map");
        Box::new(JsonFileSnapshot::new(&opts.thread_map))
    };
    let threads = ThreadStore::open(snapshot);

    let slack = Arc::new(SlackClient::new(&opts.bot_token, &opts.app_token)?);
    let bridge = Bridge::new(threads, slack.clone(), &opts.channel_id);
    let executor: Arc<dyn TmuxCommandRunner> = Arc::new(build_executor(&opts));

    if !opts.no_restore {
        restore_live_panes(&bridge, executor.as_ref(), &opts).await;
    }

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(
        bridge.clone(),
        opts.mapping_ttl()?,
        opts.sweep_interval(),
        cancel.clone(),
    );

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let router = ReplyRouter::new(bridge.clone(), Arc::clone(&executor));
    let router_handle = tokio::spawn(router.run(inbound_rx, cancel.clone()));
    let listener_handle = tokio::spawn(slack::run_socket_mode(
        slack,
        opts.channel_id.clone(),
        inbound_tx,
        cancel.clone(),
    ));

    let addr = SocketAddr::new(opts.host, opts.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "bridge server listening");

    let served = axum::serve(listener, server::router(bridge))
        .with_graceful_shutdown(wait_for_shutdown(cancel.clone()))
        .await;

    cancel.cancel();
    for (task, handle) in [
        ("sweeper", sweeper),
        ("reply router", router_handle),
        ("socket mode listener", listener_handle),
    ] {
        if let Err(e) = handle.await {
            tracing::warn!(task, "background task panicked: {e}");
        }
    }

    served.context("http server failed")?;
    tracing::info!("bridge stopped");
    Ok(())
}

/// Resolve on ctrl-c, SIGTERM, or an internal cancel.
async fn wait_for_shutdown(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            () = cancel.cancelled() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            () = cancel.cancelled() => {}
        }
    }

    cancel.cancel();
}

async fn restore_live_panes(bridge: &Bridge, runner: &dyn TmuxCommandRunner, opts: &ServeOpts) {
    match list_tagged_panes(runner, &opts.session, &opts.pane_tag).await {
        Ok(panes) => {
            let restored = bridge.restore_live_panes(&opts.session, &panes).await;
            tracing::info!(
                session = %opts.session,
                live = panes.len(),
                restored,
                "startup reconnect finished"
            );
        }
        Err(e) => {
            tracing::warn!(
                session = %opts.session,
                "could not list tmux panes, skipping startup reconnect: {e}"
            );
        }
    }
}

fn build_executor(opts: &ServeOpts) -> TmuxExecutor {
    let mut executor = TmuxExecutor::default().with_timeout(opts.tmux_timeout());
    if let Some(ref socket) = opts.tmux_socket {
        executor = executor.with_socket_path(socket.clone());
    }
    executor
}
