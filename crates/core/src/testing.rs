//! In-memory port implementations for tests and offline runs.
//!
//! [`FakeTransport`] answers requests from scripted routes and records what it
//! was sent; [`crate::MemoryCredentialStore`] covers the credential side.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{HttpTransport, PreparedRequest, RawResponse, TransportError};

#[derive(Debug, Clone)]
enum Scripted {
    Respond { status: u16, body: Vec<u8> },
    Fail { message: String },
}

/// Scripted [`HttpTransport`].
///
/// Routes are matched against the request URL by prefix and the longest
/// matching prefix wins. The fallback answers anything left over; without one,
/// unmatched requests fail as network errors.
#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: Vec<(String, Scripted)>,
    fallback: Option<Scripted>,
    sent: Mutex<Vec<PreparedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every unmatched request with `status` and `body`.
    pub fn respond(mut self, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.fallback = Some(Scripted::Respond {
            status,
            body: body.into(),
        });
        self
    }

    /// Answers requests whose URL starts with `prefix`.
    pub fn respond_to(
        mut self,
        prefix: impl Into<String>,
        status: u16,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        self.routes.push((
            prefix.into(),
            Scripted::Respond {
                status,
                body: body.into(),
            },
        ));
        self
    }

    /// Fails every unmatched request as a network error.
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.fallback = Some(Scripted::Fail {
            message: message.into(),
        });
        self
    }

    /// Every request received so far, in arrival order.
    pub fn sent(&self) -> Vec<PreparedRequest> {
        self.sent.lock().clone()
    }

    fn script_for(&self, url: &str) -> Option<&Scripted> {
        self.routes
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, scripted)| scripted)
            .or(self.fallback.as_ref())
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let url = request.url.clone();
        self.sent.lock().push(request);
        // Give concurrently dispatched requests a chance to interleave.
        tokio::task::yield_now().await;

        match self.script_for(&url) {
            Some(Scripted::Respond { status, body }) => {
                Ok(RawResponse::new(*status, url, body.clone()))
            }
            Some(Scripted::Fail { message }) => Err(TransportError::Network {
                url,
                message: message.clone(),
            }),
            None => Err(TransportError::Network {
                url,
                message: "no scripted response".to_string(),
            }),
        }
    }
}
