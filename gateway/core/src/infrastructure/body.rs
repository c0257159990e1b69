// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Body types shared by both legs of a proxied exchange.

use bytes::Bytes;
use hyper::body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased body used for requests sent to the backend and for every
/// response returned to the client.
pub type GatewayBody = UnsyncBoxBody<Bytes, BoxError>;

/// Erase a concrete body (client `Incoming`, backend `Incoming`, `Full`).
pub fn box_body<B>(body: B) -> GatewayBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

pub fn empty() -> GatewayBody {
    box_body(Empty::<Bytes>::new())
}

pub fn full(data: impl Into<Bytes>) -> GatewayBody {
    box_body(Full::new(data.into()))
}
