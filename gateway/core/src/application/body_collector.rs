// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Body Collector
//!
//! Buffers a protected request body up to a hard ceiling. The body is read
//! frame by frame through [`Limited`]; the first frame that would push the
//! total past the ceiling ends collection and the rest of the body is never
//! read.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Bounded memory for inspected payloads

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use thiserror::Error;

use crate::infrastructure::body::BoxError;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    Read(#[source] BoxError),
}

/// Collect `body` into memory. A body of exactly `limit` bytes is accepted.
pub async fn collect_bounded<B>(body: B, limit: usize) -> Result<Bytes, CollectError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(CollectError::TooLarge { limit })
        }
        Err(e) => Err(CollectError::Read(e)),
    }
}
