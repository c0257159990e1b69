// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gateway Configuration
//!
//! Resolved once at startup by the binary and handed to the listeners and
//! the [`crate::Gateway`]. Nothing here changes after construction.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Listener, backend and body-limit settings

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Docker's default local socket.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Largest container-create payload that will be buffered for inspection.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

pub const DEFAULT_TCP_HOST: &str = "0.0.0.0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No listener configured: set a TCP port and/or a socket path")]
    NoListeners,

    #[error("Invalid backend address: {0}")]
    InvalidBackend(String),

    #[error("Invalid listener port: {0}")]
    InvalidPort(String),

    #[error("Body size limit must be greater than zero")]
    InvalidBodyLimit,
}

/// Where the privileged API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    Unix(PathBuf),
    Tcp(String),
}

impl BackendTarget {
    /// Accepts `unix:///path`, `tcp://host:port`, or a bare socket path.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::InvalidBackend("empty address".to_string()));
        }

        if let Some(addr) = value.strip_prefix("tcp://") {
            let addr = addr.trim_end_matches('/');
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(BackendTarget::Tcp(addr.to_string()))
                }
                _ => Err(ConfigError::InvalidBackend(value.to_string())),
            }
        } else if let Some(path) = value.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ConfigError::InvalidBackend(value.to_string()));
            }
            Ok(BackendTarget::Unix(PathBuf::from(path)))
        } else {
            Ok(BackendTarget::Unix(PathBuf::from(value)))
        }
    }
}

impl Default for BackendTarget {
    fn default() -> Self {
        BackendTarget::Unix(PathBuf::from(DEFAULT_DOCKER_SOCKET))
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendTarget::Unix(path) => write!(f, "unix://{}", path.display()),
            BackendTarget::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// TCP listener port; `None` disables the TCP listener.
    pub tcp_port: Option<u16>,
    pub tcp_host: String,
    /// Unix listener path; `None` disables the Unix listener.
    pub socket_path: Option<PathBuf>,
    pub backend: BackendTarget,
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tcp_port: None,
            tcp_host: DEFAULT_TCP_HOST.to_string(),
            socket_path: None,
            backend: BackendTarget::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tcp_port.is_none() && self.socket_path.is_none() {
            return Err(ConfigError::NoListeners);
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::InvalidBodyLimit);
        }
        Ok(())
    }

    pub fn tcp_addr(&self) -> Option<String> {
        self.tcp_port
            .map(|port| format!("{}:{}", self.tcp_host, port))
    }
}

/// Interpret a listener port setting where an empty value means disabled.
pub fn parse_optional_port(value: Option<&str>) -> Result<Option<u16>, ConfigError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<u16>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidPort(raw.to_string())),
    }
}

/// Interpret a socket path setting where an empty value means disabled.
pub fn parse_optional_path(value: Option<&str>) -> Option<PathBuf> {
    match value.map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(PathBuf::from(raw)),
    }
}
