// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Presentation layer: listeners and the HTTP/1.1 connection loop.

pub mod server;

pub use server::{bind_listeners, serve, serve_connection, Listener, ServerError};
