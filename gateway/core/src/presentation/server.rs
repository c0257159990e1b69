// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Listeners
//!
//! The gateway listens on a TCP port, a Unix socket, or both. Each accepted
//! connection gets its own task running a hyper HTTP/1.1 server with upgrade
//! support; nothing is shared between connections except the [`Gateway`].
//!
//! No read, idle or header timeouts are configured. Attach and exec sessions
//! stay open for as long as the user keeps them open.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Accept loop and per-connection protocol driver

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::application::gateway::Gateway;
use crate::domain::gateway_config::GatewayConfig;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind TCP listener on {addr}: {source}")]
    BindTcp {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind Unix socket {}: {source}", path.display())]
    BindUnix {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove stale socket file {}: {source}", path.display())]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Removes the socket file when the listener is dropped.
#[derive(Debug)]
pub struct SocketFileGuard {
    path: PathBuf,
}

impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
            }
        }
    }
}

#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix {
        listener: UnixListener,
        guard: SocketFileGuard,
    },
}

impl Listener {
    pub async fn bind_tcp(addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::BindTcp {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self::Tcp(listener))
    }

    /// Bind a Unix socket, first removing a socket left at `path` by a
    /// previous run. Anything other than a socket at `path` is left alone
    /// and reported as an error.
    pub fn bind_unix(path: &Path) -> Result<Self, ServerError> {
        remove_stale_socket(path).map_err(|source| ServerError::StaleSocket {
            path: path.to_path_buf(),
            source,
        })?;

        let listener = UnixListener::bind(path).map_err(|source| ServerError::BindUnix {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::Unix {
            listener,
            guard: SocketFileGuard {
                path: path.to_path_buf(),
            },
        })
    }

    /// Bound address of a TCP listener. `None` for Unix sockets.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            Self::Unix { .. } => None,
        }
    }

    async fn accept(&self) -> io::Result<Connection> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                }
                Ok(Connection::Tcp(stream, peer))
            }
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Connection::Unix(stream))
            }
        }
    }
}

fn remove_stale_socket(path: &Path) -> io::Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if !metadata.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        ));
    }

    std::fs::remove_file(path)?;
    debug!(path = %path.display(), "Removed stale socket file");
    Ok(())
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => write!(f, "tcp://{addr}"),
                Err(_) => write!(f, "tcp://<unbound>"),
            },
            Self::Unix { guard, .. } => write!(f, "unix://{}", guard.path.display()),
        }
    }
}

enum Connection {
    Tcp(TcpStream, SocketAddr),
    Unix(UnixStream),
}

impl Connection {
    async fn serve(self, gateway: Arc<Gateway>) {
        match self {
            Self::Tcp(stream, peer) => {
                debug!(%peer, "Accepted TCP connection");
                serve_connection(stream, gateway).await;
            }
            Self::Unix(stream) => {
                debug!("Accepted Unix socket connection");
                serve_connection(stream, gateway).await;
            }
        }
    }
}

/// Bind every listener the configuration enables. The first failure aborts
/// startup; listeners bound before it are dropped (and their socket files
/// removed).
pub async fn bind_listeners(config: &GatewayConfig) -> Result<Vec<Listener>, ServerError> {
    let mut listeners = Vec::new();

    if let Some(addr) = config.tcp_addr() {
        let listener = Listener::bind_tcp(&addr).await?;
        info!(endpoint = %listener, "TCP listener bound");
        listeners.push(listener);
    }

    if let Some(path) = &config.socket_path {
        let listener = Listener::bind_unix(path)?;
        info!(endpoint = %listener, "Unix socket listener bound");
        listeners.push(listener);
    }

    Ok(listeners)
}

/// Accept connections until `shutdown` resolves. Connections already
/// accepted keep running on their own tasks.
pub async fn serve<F>(listener: Listener, gateway: Arc<Gateway>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let endpoint = listener.to_string();
    info!(%endpoint, backend = %gateway.backend_target(), "Serving");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(%endpoint, "Listener stopped");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok(conn) => {
                        tokio::spawn(conn.serve(gateway.clone()));
                    }
                    Err(e) => error!(%endpoint, error = %e, "Failed to accept connection"),
                }
            }
        }
    }
}

/// Drive one client connection to completion.
///
/// A [`GatewayError`](crate::application::gateway::GatewayError) from the
/// service makes hyper close the socket without writing a response.
pub async fn serve_connection<S>(stream: S, gateway: Arc<Gateway>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let gateway = gateway.clone();
        async move { gateway.handle(req).await }
    });

    if let Err(e) = http1::Builder::new()
        .preserve_header_case(true)
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
    {
        debug!(error = %e, "Client connection closed with error");
    }
}
