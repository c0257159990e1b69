// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Request Router
//!
//! Classifies a request target as protected (container creation, payload is
//! inspected) or transparent (forwarded untouched). The match is a security
//! boundary, so it over-matches: any method, any content type, repeated
//! slashes, optional `vX.Y` API version prefix, and a trailing suffix after
//! `create` are all still protected.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Routing decision for requests and upgrades alike

use std::borrow::Cow;
use std::sync::LazyLock;

use http::Uri;
use percent_encoding::percent_decode_str;
use regex::Regex;

/// `/containers/create` behind any `v<digits and dots>` version segment,
/// slash-tolerant.
pub const CREATE_PATH_PATTERN: &str = r"^/*(v[\d.]*/*)?containers/*create";

static CREATE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(CREATE_PATH_PATTERN).expect("create path pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Payload must pass the policy before forwarding; upgrades are refused.
    Protected,
    /// Forwarded byte-for-byte.
    Transparent,
}

impl RouteClass {
    pub fn is_protected(&self) -> bool {
        matches!(self, RouteClass::Protected)
    }
}

/// Classify a raw request target (path plus optional query).
///
/// The percent-decoded form is checked as well so that an encoded slash or
/// letter cannot slip a create call past the pattern.
pub fn classify(target: &str) -> RouteClass {
    if CREATE_PATH.is_match(target) {
        return RouteClass::Protected;
    }

    let decoded: Cow<'_, str> = percent_decode_str(target).decode_utf8_lossy();
    if CREATE_PATH.is_match(&decoded) {
        return RouteClass::Protected;
    }

    RouteClass::Transparent
}

/// Classify a request URI. Scheme and authority of absolute-form targets are
/// ignored; only what the backend would route on counts.
pub fn classify_uri(uri: &Uri) -> RouteClass {
    classify(origin_form(uri))
}

/// The origin-form target (`/path?query`) for a URI, `/` when empty.
pub fn origin_form(uri: &Uri) -> &str {
    match uri.path_and_query() {
        Some(pq) if !pq.as_str().is_empty() => pq.as_str(),
        _ => "/",
    }
}
