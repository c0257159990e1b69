// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure admission rules with no I/O

pub mod gateway_config;
pub mod policy;
pub mod route;
pub mod validation;
