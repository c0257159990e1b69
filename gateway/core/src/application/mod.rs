// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: the admission pipeline that sits between the
//! listeners and the backend.

pub mod body_collector;
pub mod gateway;
