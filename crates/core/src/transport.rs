//! Network port.
//!
//! The core never performs I/O itself; it hands a fully built
//! [`PreparedRequest`] to an [`HttpTransport`] implementation supplied by an
//! infrastructure crate and gets a [`RawResponse`] back.

use async_trait::async_trait;
use thiserror::Error;

use crate::{PreparedRequest, RawResponse};

/// The network call failed or did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request never produced a response (DNS, connect, TLS, reset).
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// A response arrived with a status outside 2xx.
    #[error("server answered with status {status}")]
    Status { status: u16 },

    /// The response body could not be read.
    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Issues exactly one network call per request.
///
/// Implementations must not retry and must not impose a timeout of their own.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError>;
}
