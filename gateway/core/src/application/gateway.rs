// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Admission Gateway
//!
//! Entry point for every request accepted by a listener.
//!
//! ## Request Pipeline
//!
//! ```text
//! request
//!   ├─ upgrade?   protected → 403 FORBIDDEN (backend never contacted)
//!   │             transparent → UpgradeSplicer
//!   ├─ transparent → Forwarder (streamed as received)
//!   └─ protected  → collect_bounded ─┬─ too large   → 413
//!                                    ├─ not JSON    → 400
//!                                    ├─ violations  → 403 {message, errors}
//!                                    └─ admitted    → Forwarder (filtered JSON)
//! ```
//!
//! Backend failures surface as [`GatewayError`]. Returning an error from the
//! connection's service makes hyper drop the client connection without a
//! response, which is the intended abort: a half-finished create call must
//! never be answered with something that looks like success.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{Request, Response, StatusCode};
use hyper::body::Body;
use hyper::ext::ReasonPhrase;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::application::body_collector::{collect_bounded, CollectError};
use crate::domain::gateway_config::GatewayConfig;
use crate::domain::policy::{container_create_policy, ObjectSchema};
use crate::domain::route::{classify_uri, RouteClass};
use crate::domain::validation::{PolicyValidator, Violation};
use crate::infrastructure::backend::{connector_for, BackendConnector, BackendError};
use crate::infrastructure::body::{box_body, empty, full, BoxError, GatewayBody};
use crate::infrastructure::forwarder::Forwarder;
use crate::infrastructure::splicer::{forbidden_upgrade, is_upgrade_request, UpgradeSplicer};

pub const FORBIDDEN_MESSAGE: &str = "Forbidden container configuration";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Client body read failed: {0}")]
    ClientBody(#[source] BoxError),

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Verdict on a fully collected protected body.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    TooLarge,
    InvalidJson,
    Forbidden(Vec<Violation>),
    /// Re-serialized filtered payload, ready to forward.
    Admitted(Bytes),
}

pub struct Gateway {
    validator: PolicyValidator,
    forwarder: Forwarder,
    splicer: UpgradeSplicer,
    max_body_size: usize,
}

impl Gateway {
    pub fn new(schema: Arc<ObjectSchema>, connector: Arc<dyn BackendConnector>, max_body_size: usize) -> Self {
        let forwarder = Forwarder::new(connector);
        Self {
            validator: PolicyValidator::new(schema),
            splicer: UpgradeSplicer::new(forwarder.clone()),
            forwarder,
            max_body_size,
        }
    }

    /// Gateway enforcing the container-create policy against the configured backend.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            Arc::new(container_create_policy()),
            connector_for(&config.backend),
            config.max_body_size,
        )
    }

    pub fn backend_target(&self) -> String {
        self.forwarder.target()
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<GatewayBody>, GatewayError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let route = classify_uri(req.uri());

        if is_upgrade_request(&req) {
            if route.is_protected() {
                warn!(method = %req.method(), uri = %req.uri(), "FORBIDDEN: upgrade attempted on protected path");
                return Ok(forbidden_upgrade());
            }
            return Ok(self.splicer.forward_upgrade(req.map(box_body)).await?);
        }

        match route {
            RouteClass::Transparent => Ok(self.forwarder.forward(req.map(box_body)).await?),
            RouteClass::Protected => self.handle_protected(req).await,
        }
    }

    async fn handle_protected<B>(&self, req: Request<B>) -> Result<Response<GatewayBody>, GatewayError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = req.into_parts();
        let collected = collect_bounded(body, self.max_body_size).await;

        match self.admit(collected)? {
            Admission::TooLarge => {
                warn!(
                    limit = self.max_body_size,
                    method = %parts.method,
                    uri = %parts.uri,
                    "Request rejected 413: payload exceeds limit"
                );
                Ok(reject(StatusCode::PAYLOAD_TOO_LARGE, b"Request Too Large", empty()))
            }
            Admission::InvalidJson => {
                warn!(method = %parts.method, uri = %parts.uri, "Request rejected 400: invalid JSON payload");
                Ok(reject(StatusCode::BAD_REQUEST, b"Invalid JSON Payload", empty()))
            }
            Admission::Forbidden(violations) => {
                warn!(
                    method = %parts.method,
                    uri = %parts.uri,
                    violations = violations.len(),
                    "Request rejected 403: forbidden container configuration"
                );
                debug!(?violations, "Policy violations");
                let body = serde_json::to_string_pretty(&json!({
                    "message": FORBIDDEN_MESSAGE,
                    "errors": violations,
                }))?;
                let mut res = reject(
                    StatusCode::FORBIDDEN,
                    b"Forbidden Container Configuration",
                    full(body),
                );
                res.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(res)
            }
            Admission::Admitted(payload) => {
                parts.headers.remove(TRANSFER_ENCODING);
                parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(payload.len()));
                let req = Request::from_parts(parts, full(payload));
                Ok(self.forwarder.forward(req).await?)
            }
        }
    }

    /// Decide what to do with a collected protected body.
    ///
    /// Pure apart from logging: no I/O, so every terminal state of the
    /// protected pipeline can be exercised without a backend.
    pub fn admit(&self, collected: Result<Bytes, CollectError>) -> Result<Admission, GatewayError> {
        let raw = match collected {
            Ok(raw) => raw,
            Err(CollectError::TooLarge { .. }) => return Ok(Admission::TooLarge),
            Err(CollectError::Read(e)) => {
                error!(error = %e, "Client body stream failed");
                return Err(GatewayError::ClientBody(e));
            }
        };

        let payload: Value = match serde_json::from_slice(&raw) {
            Ok(payload) => payload,
            Err(_) => return Ok(Admission::InvalidJson),
        };

        match self.validator.admit(payload) {
            Ok(filtered) => Ok(Admission::Admitted(Bytes::from(serde_json::to_vec(&filtered)?))),
            Err(violations) => Ok(Admission::Forbidden(violations)),
        }
    }
}

/// Response produced by the gateway itself. Always closes the connection.
fn reject(status: StatusCode, reason: &'static [u8], body: GatewayBody) -> Response<GatewayBody> {
    let mut res = Response::new(body);
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    res.extensions_mut().insert(ReasonPhrase::from_static(reason));
    res
}
