//! The single entry point for inbound messages.

use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use crate::{
    CallerIdentity, CredentialResolver, DispatchError, DispatchId, Entry, HttpTransport, Message,
    Payload, Registry, Reply, RequestBuilder,
};

/// Routes messages to registered operations.
///
/// Every failure (unknown operation, credential lookup, request building,
/// transport, pipeline, invocable) is logged and swallowed: the only thing a
/// caller ever observes is whether its reply channel is called. Concurrent
/// dispatches share nothing mutable; the registry is read-only.
pub struct Dispatcher {
    registry: Arc<Registry>,
    requests: RequestBuilder,
    credentials: CredentialResolver,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn HttpTransport>,
        credentials: CredentialResolver,
    ) -> Self {
        Self {
            registry,
            requests: RequestBuilder::new(transport),
            credentials,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handles one message to completion.
    ///
    /// Resolves with the operation's result for callers that await it
    /// directly, or `None` when the result went through `reply`, when the
    /// operation produced nothing, or when anything failed.
    pub async fn dispatch(
        &self,
        message: Message,
        caller: Option<CallerIdentity>,
        reply: Option<Reply>,
    ) -> Option<Value> {
        let dispatch_id = DispatchId::new_random();
        let span = tracing::info_span!(
            "dispatch",
            %dispatch_id,
            operation = message.operation().unwrap_or_default(),
            tab = ?caller.as_ref().and_then(CallerIdentity::tab_id),
        );

        async move {
            match self.try_dispatch(message, caller, reply).await {
                Ok(out) => {
                    tracing::debug!(has_result = out.is_some(), "dispatch finished");
                    out
                }
                Err(e) => {
                    tracing::error!(kind = %e.kind(), error = %e, "dispatch failed");
                    None
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fire-and-forget variant of [`Dispatcher::dispatch`] on the current runtime.
    pub fn spawn(
        self: &Arc<Self>,
        message: Message,
        caller: Option<CallerIdentity>,
        reply: Option<Reply>,
    ) -> tokio::task::JoinHandle<Option<Value>> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.dispatch(message, caller, reply).await })
    }

    async fn try_dispatch(
        &self,
        message: Message,
        caller: Option<CallerIdentity>,
        reply: Option<Reply>,
    ) -> Result<Option<Value>, DispatchError> {
        let name = message.operation().ok_or(DispatchError::MissingOperation)?;
        let entry = self
            .registry
            .lookup(name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownOperation {
                name: name.to_string(),
            })?;

        match entry {
            Entry::Invocable(operation) => operation.invoke(message, caller, reply).await,
            Entry::Descriptor(descriptor) => {
                let jar = self
                    .credentials
                    .resolve(&descriptor, caller.as_ref())
                    .await?;
                let out = self
                    .requests
                    .try_send(&descriptor, message.fields(), jar.as_ref(), reply.as_ref())
                    .await?;
                Ok(out.map(Payload::into_value))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("operations", &self.registry.len())
            .field("credentials", &self.credentials)
            .finish()
    }
}
