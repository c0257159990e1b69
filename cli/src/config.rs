// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Turns parsed command-line/environment settings into a validated
//! [`GatewayConfig`].

use dockgate_core::domain::gateway_config::{
    parse_optional_path, parse_optional_port, BackendTarget, ConfigError, GatewayConfig,
};

use crate::Cli;

pub fn gateway_config(cli: &Cli) -> Result<GatewayConfig, ConfigError> {
    let config = GatewayConfig {
        tcp_port: parse_optional_port(cli.port.as_deref())?,
        tcp_host: cli.host.clone(),
        socket_path: parse_optional_path(cli.socket_path.as_deref()),
        backend: BackendTarget::parse(&cli.docker_socket)?,
        max_body_size: cli.max_json_size,
    };

    config.validate()?;
    Ok(config)
}
