// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Upgrade Splicer
//!
//! Docker hijacks the HTTP connection for `attach`, `exec` and similar
//! interactive calls: the client asks for `Upgrade: tcp`, Docker answers
//! `101 UPGRADED`, and from then on both sockets carry a raw stream.
//!
//! ```text
//! client ──upgrade req──▶ gateway ──same req──▶ backend
//!        ◀────── 101 ──── gateway ◀──── 101 ───
//!        ◀═══════ copy_bidirectional ══════════▶
//! ```
//!
//! If the backend answers anything other than `101` the response is relayed
//! as a normal response and no splice happens. Upgrades on protected paths
//! never get this far; see [`forbidden_upgrade`].

use http::header::{HeaderValue, CONNECTION};
use http::{Request, Response, StatusCode};
use hyper::ext::ReasonPhrase;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tracing::{debug, info, warn};

use crate::infrastructure::backend::BackendError;
use crate::infrastructure::body::{box_body, empty, GatewayBody};
use crate::infrastructure::forwarder::Forwarder;

/// Whether a request asks to leave HTTP: `Connection: upgrade` together with
/// an `Upgrade` header, or a `CONNECT`.
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    if req.method() == http::Method::CONNECT {
        return true;
    }

    let connection_upgrade = req
        .headers()
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && req.headers().contains_key(http::header::UPGRADE)
}

/// `403 FORBIDDEN` with `connection: close`, sent instead of ever contacting
/// the backend.
pub fn forbidden_upgrade() -> Response<GatewayBody> {
    let mut res = Response::new(empty());
    *res.status_mut() = StatusCode::FORBIDDEN;
    res.headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    res.extensions_mut()
        .insert(ReasonPhrase::from_static(b"FORBIDDEN"));
    res
}

/// The two raw halves of an upgraded session.
pub struct ConnectionPair {
    client: TokioIo<Upgraded>,
    backend: TokioIo<Upgraded>,
}

impl ConnectionPair {
    /// Wait until both sides have switched protocols.
    pub async fn establish(client: OnUpgrade, backend: OnUpgrade) -> Result<Self, BackendError> {
        let (client, backend) = tokio::try_join!(client, backend).map_err(BackendError::Upgrade)?;
        Ok(Self {
            client: TokioIo::new(client),
            backend: TokioIo::new(backend),
        })
    }

    /// Copy bytes both ways until both directions reach end of stream.
    /// Returns `(client_to_backend, backend_to_client)` byte counts.
    pub async fn run(mut self) -> Result<(u64, u64), BackendError> {
        tokio::io::copy_bidirectional(&mut self.client, &mut self.backend)
            .await
            .map_err(BackendError::Splice)
    }
}

#[derive(Clone)]
pub struct UpgradeSplicer {
    forwarder: Forwarder,
}

impl UpgradeSplicer {
    pub fn new(forwarder: Forwarder) -> Self {
        Self { forwarder }
    }

    /// Forward an upgrade request on a transparent path.
    pub async fn forward_upgrade(&self, mut req: Request<GatewayBody>) -> Result<Response<GatewayBody>, BackendError> {
        let uri = req.uri().clone();
        let client_upgrade = hyper::upgrade::on(&mut req);

        let mut res = self.forwarder.send(req).await?;

        if res.status() != StatusCode::SWITCHING_PROTOCOLS {
            info!(%uri, status = res.status().as_u16(), "Backend declined upgrade");
            return Ok(res.map(box_body));
        }

        debug!(%uri, "Upgrade accepted by backend, splicing");
        let backend_upgrade = hyper::upgrade::on(&mut res);
        tokio::spawn(async move {
            let pair = match ConnectionPair::establish(client_upgrade, backend_upgrade).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(%uri, error = %e, "Upgrade handshake did not complete");
                    return;
                }
            };
            match pair.run().await {
                Ok((up, down)) => debug!(%uri, up, down, "Spliced session closed"),
                Err(e) => debug!(%uri, error = %e, "Spliced session ended with error"),
            }
        });

        let (parts, _body) = res.into_parts();
        Ok(Response::from_parts(parts, empty()))
    }
}
