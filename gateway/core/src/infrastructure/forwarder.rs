// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Downstream Forwarder
//!
//! Replays a client request onto a brand-new backend connection and hands
//! the backend response back untouched: status, reason phrase, header names
//! (case preserved) and values, then the streamed body.
//!
//! Failures are never retried. A create call may already have taken effect
//! on the backend, so the caller aborts the client connection instead.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** One request, one backend connection

use std::sync::Arc;

use http::uri::PathAndQuery;
use http::{Request, Response, Uri};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tracing::{debug, error};

use crate::domain::route::origin_form;
use crate::infrastructure::backend::{BackendConnector, BackendError};
use crate::infrastructure::body::{box_body, GatewayBody};

#[derive(Clone)]
pub struct Forwarder {
    connector: Arc<dyn BackendConnector>,
}

impl Forwarder {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self { connector }
    }

    pub fn target(&self) -> String {
        self.connector.target()
    }

    /// Send `req` to the backend and return the raw backend response.
    ///
    /// The backend connection task is spawned with upgrade support so that
    /// a `101` response can later be claimed with `hyper::upgrade::on`.
    pub async fn send(&self, mut req: Request<GatewayBody>) -> Result<Response<Incoming>, BackendError> {
        let stream = self.connector.connect().await.map_err(|e| {
            error!(error = %e, "Backend connection failed");
            e
        })?;

        let (mut sender, conn) = http1::Builder::new()
            .preserve_header_case(true)
            .handshake::<_, GatewayBody>(TokioIo::new(stream))
            .await
            .map_err(BackendError::Handshake)?;

        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                debug!(error = %e, "Backend connection closed with error");
            }
        });

        *req.uri_mut() = to_origin_form(req.uri());

        sender.send_request(req).await.map_err(|e| {
            error!(error = %e, target = %self.connector.target(), "Backend request failed");
            BackendError::Request(e)
        })
    }

    /// Send `req` and relay the response with its body type erased.
    pub async fn forward(&self, req: Request<GatewayBody>) -> Result<Response<GatewayBody>, BackendError> {
        let method = req.method().clone();
        let uri = req.uri().clone();

        let res = self.send(req).await?;
        debug!(%method, %uri, status = res.status().as_u16(), "Relaying backend response");

        Ok(res.map(box_body))
    }
}

fn to_origin_form(uri: &Uri) -> Uri {
    let target = origin_form(uri);
    match PathAndQuery::try_from(target) {
        Ok(pq) => Uri::from(pq),
        Err(_) => uri.clone(),
    }
}
