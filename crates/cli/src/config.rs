//! Command-line and environment configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use courier_core::{CookieStoreId, Credential, CredentialPolicy, MemoryCredentialStore};
use courier_http::TransportConfig;
use thiserror::Error;

/// Log output encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// Dispatches JSON messages read from stdin to registered remote operations.
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
pub struct Config {
    /// JSON catalog of operations. The built-in catalog is used when absent.
    #[arg(long, value_name = "FILE", env = "COURIER_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// JSON map from cookie-store id to `[{ "name", "value" }]` credentials.
    #[arg(long, value_name = "FILE", env = "COURIER_CREDENTIAL_STORES")]
    pub credential_stores: Option<PathBuf>,

    /// Attach the caller's own credential jar to each request.
    #[arg(long, env = "COURIER_ISOLATED_IDENTITIES")]
    pub isolated_identities: bool,

    /// Move the injected credential header into `Cookie` before sending.
    #[arg(long, env = "COURIER_REWRITE_CREDENTIAL_HEADER")]
    pub rewrite_credential_header: bool,

    /// `User-Agent` sent with every request.
    #[arg(long, env = "COURIER_USER_AGENT")]
    pub user_agent: Option<String>,

    #[arg(long, value_enum, default_value = "json", env = "COURIER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// OTLP gRPC collector endpoint. Spans are exported only when set.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

/// A configuration value is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--otlp-endpoint must be an http:// or https:// URL, got '{0}'")]
    OtlpEndpoint(String),

    #[error("--user-agent must not be empty")]
    EmptyUserAgent,

    #[error("--credential-stores requires --isolated-identities")]
    StoresWithoutIsolation,
}

impl Config {
    /// Checks values that clap cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.otlp_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::OtlpEndpoint(endpoint.clone()));
            }
        }
        if self.user_agent.as_deref().is_some_and(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::EmptyUserAgent);
        }
        if self.credential_stores.is_some() && !self.isolated_identities {
            return Err(ConfigError::StoresWithoutIsolation);
        }
        Ok(())
    }

    pub fn credential_policy(&self) -> CredentialPolicy {
        CredentialPolicy {
            isolated_identities: self.isolated_identities,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            user_agent: self.user_agent.clone(),
            rewrite_credential_header: self.rewrite_credential_header,
        }
    }
}

/// Reads a credential-store file into an in-memory store.
pub async fn load_credential_stores(path: &Path) -> anyhow::Result<MemoryCredentialStore> {
    use anyhow::Context;

    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read credential stores from {}", path.display()))?;
    let stores: HashMap<CookieStoreId, Vec<Credential>> = serde_json::from_str(&text)
        .with_context(|| format!("invalid credential stores in {}", path.display()))?;
    tracing::info!(path = %path.display(), stores = stores.len(), "loaded credential stores");
    Ok(MemoryCredentialStore::new(stores))
}
