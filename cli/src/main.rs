// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # dockgate
//!
//! Admission-control gateway for the Docker API.
//!
//! Clients talk to dockgate exactly as they would talk to `dockerd`.
//! Container-create calls are filtered and validated against a whitelist
//! policy; everything else, including `attach`/`exec` upgrades, is proxied
//! unchanged to the real Docker socket.
//!
//! ## Configuration
//!
//! Every flag has an environment variable, and a `.env` file in the working
//! directory is loaded first:
//!
//! - `PORT` / `--port`: TCP listener port (empty disables it)
//! - `DOCKGATE_HOST` / `--host`: TCP listener address
//! - `SOCKET_PATH` / `--socket-path`: Unix listener path (empty disables it)
//! - `DOCKER_SOCKET_PATH` / `--docker-socket`: backend, a path or `tcp://host:port`
//! - `MAX_JSON_SIZE` / `--max-json-size`: create payload ceiling in bytes
//! - `DOCKGATE_LOG_LEVEL` / `--log-level`: log filter when `RUST_LOG` is unset

use anyhow::{Context, Result};
use clap::Parser;

use dockgate_core::domain::gateway_config::{
    DEFAULT_DOCKER_SOCKET, DEFAULT_MAX_BODY_SIZE, DEFAULT_TCP_HOST,
};

mod config;
mod daemon;

/// dockgate - Docker API admission-control gateway
#[derive(Parser, Debug)]
#[command(name = "dockgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TCP listener port; empty or unset disables the TCP listener
    #[arg(long, env = "PORT", value_name = "PORT")]
    port: Option<String>,

    /// TCP listener address
    #[arg(long, env = "DOCKGATE_HOST", default_value = DEFAULT_TCP_HOST)]
    host: String,

    /// Unix socket to listen on; empty or unset disables the Unix listener
    #[arg(long, env = "SOCKET_PATH", value_name = "PATH")]
    socket_path: Option<String>,

    /// Docker API to protect: a socket path, unix:///path or tcp://host:port
    #[arg(long, env = "DOCKER_SOCKET_PATH", default_value = DEFAULT_DOCKER_SOCKET)]
    docker_socket: String,

    /// Largest container-create payload accepted, in bytes
    #[arg(long, env = "MAX_JSON_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    max_json_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DOCKGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let config = config::gateway_config(&cli).context("Invalid configuration")?;

    daemon::run(config).await
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
