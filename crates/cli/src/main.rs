//! Courier entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: flags and environment, validated before anything
//!    else is built.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or pretty layer
//!    on stderr and, when an endpoint is configured, an OpenTelemetry OTLP
//!    exporter. All spans and events from every workspace crate flow through it.
//! 3. **Construct infrastructure**: the operation registry (built-in or file
//!    catalog), the `reqwest` transport, and the credential resolver, injected
//!    into one shared `Dispatcher`.
//! 4. **Serve**: read NDJSON envelopes from stdin until it closes and write
//!    replies to stdout.

mod config;
mod observability;
mod serve;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use courier_catalog::{load_catalog, register_builtin};
use courier_core::{CredentialResolver, Dispatcher, Registry};
use courier_http::ReqwestTransport;
use tokio::io::BufReader;

use crate::config::{load_credential_stores, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;

    let telemetry = observability::init(config.log_format, config.otlp_endpoint.as_deref())?;
    let outcome = run(config).await;
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "courier stopped");
    }
    telemetry.shutdown();
    outcome
}

async fn run(config: Config) -> anyhow::Result<()> {
    let registry = build_registry(&config).await?;
    let credentials = build_credentials(&config).await?;
    let transport =
        ReqwestTransport::new(config.transport()).context("failed to construct HTTP transport")?;

    tracing::info!(
        operations = registry.len(),
        isolated_identities = config.isolated_identities,
        "courier ready"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(registry),
        Arc::new(transport),
        credentials,
    ));
    serve::serve(dispatcher, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    Ok(())
}

async fn build_registry(config: &Config) -> anyhow::Result<Registry> {
    let mut builder = Registry::builder();
    match &config.catalog {
        Some(path) => {
            let entries = load_catalog(path).await?;
            builder
                .descriptors(entries)
                .with_context(|| format!("invalid catalog {}", path.display()))?;
        }
        None => register_builtin(&mut builder).context("failed to register built-in catalog")?,
    }
    Ok(builder.build())
}

async fn build_credentials(config: &Config) -> anyhow::Result<CredentialResolver> {
    let policy = config.credential_policy();
    match &config.credential_stores {
        Some(path) => {
            let store = load_credential_stores(path).await?;
            Ok(CredentialResolver::new(policy, Arc::new(store)))
        }
        None => {
            if policy.isolated_identities {
                tracing::warn!("isolated identities enabled without credential stores");
            }
            Ok(CredentialResolver::disabled())
        }
    }
}
