// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Foreground server lifecycle: bind, serve until a signal, clean up.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dockgate_core::presentation::{bind_listeners, serve};
use dockgate_core::{Gateway, GatewayConfig};

pub async fn run(config: GatewayConfig) -> Result<()> {
    info!(
        backend = %config.backend,
        max_body_size = config.max_body_size,
        "dockgate starting"
    );

    let gateway = Arc::new(Gateway::from_config(&config));

    let listeners = bind_listeners(&config)
        .await
        .context("Failed to start listeners")?;

    let shutdown = CancellationToken::new();
    let mut servers = JoinSet::new();
    for listener in listeners {
        servers.spawn(serve(
            listener,
            gateway.clone(),
            shutdown.clone().cancelled_owned(),
        ));
    }

    shutdown_signal().await;
    shutdown.cancel();

    // Dropping each listener removes its socket file.
    while let Some(result) = servers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Listener task failed");
        }
    }

    info!("dockgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
