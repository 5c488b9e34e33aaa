// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cfd`: the castforge daemon.

use cf_daemon::lifecycle::{self, Config};
use cf_daemon::{engine_loop, listener};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_env("CASTFORGE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(parent) = config.log_path.parent() else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    };
    let Some(file_name) = config.log_path.file_name() else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    };

    let appender = tracing_appender::rolling::never(parent, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cfd: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::create_dir_all(&config.state_dir) {
        eprintln!("cfd: cannot create state dir: {e}");
        std::process::exit(1);
    }
    let _log_guard = init_tracing(&config);

    let startup = match lifecycle::startup(config).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("cfd: {e}");
            std::process::exit(1);
        }
    };
    let daemon = Arc::new(startup.daemon);
    let socket = startup.listener;

    let shutdown = CancellationToken::new();

    let listener_task = tokio::spawn(listener::run(
        Arc::clone(&daemon),
        socket,
        shutdown.clone(),
    ));
    let engine_task = tokio::spawn(engine_loop::run(
        Arc::clone(&daemon.engine),
        shutdown.clone(),
    ));

    // Socket answers immediately; reconciliation runs behind READY
    println!("READY");
    lifecycle::reconcile(&daemon).await;

    // Wait for a signal or a Shutdown request
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = shutdown.cancelled() => info!("shutdown requested via socket"),
    }
    shutdown.cancel();

    daemon.launcher.stop_all().await;
    if let Err(e) = daemon.engine.shutdown() {
        error!(error = %e, "shutdown incomplete");
    }
    let _ = std::fs::remove_file(&daemon.config.socket_path);

    let _ = listener_task.await;
    let _ = engine_task.await;
    info!("daemon stopped");
}
