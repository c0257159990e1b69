// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod backend;
pub mod body;
pub mod forwarder;
pub mod splicer;

pub use backend::{connector_for, BackendConnector, BackendError, TcpConnector, UnixSocketConnector};
pub use forwarder::Forwarder;
pub use splicer::UpgradeSplicer;
