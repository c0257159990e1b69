// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Backend Connectors
//!
//! Opens raw byte streams to the privileged Docker API. A fresh stream is
//! opened for every proxied request; nothing is pooled or reused.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Transport seam between the forwarder and the backend socket

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use crate::domain::gateway_config::BackendTarget;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to connect to backend {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("Backend HTTP handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("Backend request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("Connection upgrade failed: {0}")]
    Upgrade(#[source] hyper::Error),

    #[error("Spliced stream failed: {0}")]
    Splice(#[source] io::Error),
}

/// Any duplex byte stream that can carry HTTP/1.1 to the backend.
pub trait BackendStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> BackendStream for T {}

pub type BoxedStream = Box<dyn BackendStream>;

#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self) -> Result<BoxedStream, BackendError>;

    /// Human-readable target for logs.
    fn target(&self) -> String;
}

/// Connects to a Unix domain socket, normally `/var/run/docker.sock`.
#[derive(Debug, Clone)]
pub struct UnixSocketConnector {
    path: PathBuf,
}

impl UnixSocketConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BackendConnector for UnixSocketConnector {
    async fn connect(&self) -> Result<BoxedStream, BackendError> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|source| BackendError::Connect {
                target: self.target(),
                source,
            })?;
        Ok(Box::new(stream))
    }

    fn target(&self) -> String {
        format!("unix://{}", self.path.display())
    }
}

/// Connects to a plain-TCP Docker endpoint (`tcp://host:port`).
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl BackendConnector for TcpConnector {
    async fn connect(&self) -> Result<BoxedStream, BackendError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| BackendError::Connect {
                target: self.target(),
                source,
            })?;
        stream.set_nodelay(true).map_err(|source| BackendError::Connect {
            target: self.target(),
            source,
        })?;
        Ok(Box::new(stream))
    }

    fn target(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

pub fn connector_for(target: &BackendTarget) -> Arc<dyn BackendConnector> {
    match target {
        BackendTarget::Unix(path) => Arc::new(UnixSocketConnector::new(path.clone())),
        BackendTarget::Tcp(addr) => Arc::new(TcpConnector::new(addr.clone())),
    }
}
