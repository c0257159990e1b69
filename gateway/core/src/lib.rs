// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # dockgate core
//!
//! Admission-control gateway for a privileged Docker API socket.
//!
//! # Architecture
//!
//! - **domain**: policy schema, policy validator, route classifier, configuration
//! - **application**: bounded body collection and the admission pipeline
//! - **infrastructure**: backend connectors, downstream forwarder, upgrade splicer
//! - **presentation**: listeners and the per-connection HTTP/1.1 loop

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use application::gateway::Gateway;
pub use domain::gateway_config::{BackendTarget, GatewayConfig};
