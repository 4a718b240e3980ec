//! Request dispatch and response pipelines for an unprivileged/privileged
//! messaging boundary.
//!
//! An unprivileged caller sends a [`Message`] naming an operation. The
//! [`Dispatcher`] looks the name up in a read-only [`Registry`], resolves the
//! caller's isolated credential jar when the [`CredentialPolicy`] allows it,
//! merges the caller's fields into the operation's [`Descriptor`], issues one
//! network call through an [`HttpTransport`], and runs the descriptor's
//! [`Pipeline`] over the response. The result either resolves the dispatch
//! future or is delivered through the caller's single-use [`Reply`].
//!
//! Failures never reach the caller: they are logged and the reply is simply
//! never sent.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no network I/O.
//! It defines what a transport and a credential source must do
//! ([`HttpTransport`], [`CredentialStore`]); infrastructure crates supply them.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`OperationName`, `CookieStoreId`, etc.) |
//! | [`types`] | Shared value types (`Method`, `CredentialJar`, `CallerIdentity`, etc.) |
//! | [`errors`] | Top-level dispatch error and its taxonomy |
//! | [`message`] | Inbound messages and the reply channel |
//! | [`descriptor`] | Request templates |
//! | [`registry`] | Operation registry and the invocable escape hatch |
//! | [`request`] | Merge rule, request encoding, request execution |
//! | [`pipeline`] | Response pipeline engine |
//! | [`credentials`] | Credential policy, resolver, and store port |
//! | [`transport`] | Network port |
//! | [`dispatcher`] | Message entry point |
//! | `testing` | In-memory port implementations (`testing` feature) |

pub mod credentials;
pub mod descriptor;
pub mod dispatcher;
pub mod errors;
pub mod identifiers;
pub mod message;
pub mod pipeline;
pub mod registry;
pub mod request;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use credentials::{
    CredentialError, CredentialPolicy, CredentialResolver, CredentialStore, MemoryCredentialStore,
};
pub use descriptor::{Descriptor, DescriptorError};
pub use dispatcher::Dispatcher;
pub use errors::{DispatchError, ErrorKind};
pub use identifiers::{CookieStoreId, DispatchId, OperationName, TabId};
pub use message::{Message, Reply, OPERATION_FIELD};
pub use pipeline::{Payload, Pipeline, PipelineDefinitionError, PipelineError, Step, StepFuture};
pub use registry::{Entry, FnOperation, Invocable, Registry, RegistryBuilder, RegistryError};
pub use request::{
    build_request, BuildError, MergedRequest, PreparedRequest, RequestBody, RequestBuilder,
    CREDENTIAL_HEADER,
};
pub use transport::{HttpTransport, TransportError};
pub use types::{
    CallerIdentity, Credential, CredentialJar, CredentialsMode, Method, RawResponse, TabInfo,
};
