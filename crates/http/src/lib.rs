//! Courier network adapter.
//!
//! Implements the [`courier_core::HttpTransport`] trait over `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Client construction, the ambient cookie store, header
//! and body encoding onto the wire, and error mapping live here. The
//! [`courier_core`] crate sees only [`courier_core::HttpTransport`].
//!
//! ## Ambient credentials
//!
//! Two clients are kept. The ambient client owns a shared cookie [`Jar`] and
//! is used for every request whose credentials mode is not `omit`; the
//! anonymous client has no cookie store at all and is used for `omit`.
//!
//! An explicitly injected jar arrives as the
//! [`courier_core::CREDENTIAL_HEADER`] header. A rule outside the process is
//! normally responsible for turning it into a real `Cookie` header; with
//! [`TransportConfig::rewrite_credential_header`] set, this adapter does it
//! instead, which also suppresses the ambient cookies for that request.
//!
//! Exactly one network call is issued per request. There is no timeout and no
//! retry.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{
    CredentialsMode, HttpTransport, Method, PreparedRequest, RawResponse, RequestBody,
    TransportError, CREDENTIAL_HEADER,
};
use reqwest::header::COOKIE;
use thiserror::Error;

pub use reqwest::cookie::Jar;

/// Settings for [`ReqwestTransport`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Sent as `User-Agent` on every request when set.
    pub user_agent: Option<String>,

    /// Move the injected credential header into `Cookie` before sending.
    pub rewrite_credential_header: bool,
}

/// The HTTP client could not be constructed.
#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct ClientBuildError(#[source] reqwest::Error);

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    ambient: reqwest::Client,
    anonymous: reqwest::Client,
    jar: Arc<Jar>,
    config: TransportConfig,
}

impl ReqwestTransport {
    /// Creates a transport with an empty ambient cookie store.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the TLS backend cannot be initialised.
    pub fn new(config: TransportConfig) -> Result<Self, ClientBuildError> {
        Self::with_cookie_jar(config, Arc::new(Jar::default()))
    }

    /// Creates a transport whose ambient cookie store is `jar`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the TLS backend cannot be initialised.
    pub fn with_cookie_jar(config: TransportConfig, jar: Arc<Jar>) -> Result<Self, ClientBuildError> {
        let ambient = client_builder(&config)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(ClientBuildError)?;
        let anonymous = client_builder(&config).build().map_err(ClientBuildError)?;
        Ok(Self {
            ambient,
            anonymous,
            jar,
            config,
        })
    }

    /// The ambient cookie store shared by every non-`omit` request.
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    fn client_for(&self, mode: Option<CredentialsMode>) -> &reqwest::Client {
        match mode {
            Some(CredentialsMode::Omit) => &self.anonymous,
            _ => &self.ambient,
        }
    }
}

fn client_builder(config: &TransportConfig) -> reqwest::ClientBuilder {
    let builder = reqwest::Client::builder();
    match &config.user_agent {
        Some(agent) => builder.user_agent(agent.clone()),
        None => builder,
    }
}

fn wire_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let PreparedRequest {
            method,
            url,
            headers,
            credentials,
            body,
        } = request;

        let mut builder = self
            .client_for(credentials)
            .request(wire_method(method), &url);
        for (name, value) in headers {
            if self.config.rewrite_credential_header && name.eq_ignore_ascii_case(CREDENTIAL_HEADER)
            {
                builder = builder.header(COOKIE, value);
            } else {
                builder = builder.header(name, value);
            }
        }
        if let Some(RequestBody::Form(text) | RequestBody::Json(text)) = body {
            builder = builder.body(text);
        }

        let response = builder.send().await.map_err(|e| TransportError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await.map_err(|e| TransportError::Body {
            url: final_url.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            %method,
            url = %url,
            status,
            bytes = bytes.len(),
            "http exchange complete"
        );

        Ok(RawResponse {
            status,
            url: final_url,
            headers: response_headers,
            body: bytes.to_vec(),
        })
    }
}
