//! Top-level error types for the dispatch domain.
//!
//! [`DispatchError`] covers every condition that ends a single dispatch early.
//! Component-level errors ([`BuildError`], [`TransportError`], [`PipelineError`],
//! [`CredentialError`]) are defined in their respective modules and fold into
//! it via `From`.
//!
//! None of these ever reach the sender of a message: the
//! [`crate::Dispatcher`] logs them with their [`ErrorKind`] and drops them.
//! The caller's only signal is whether a reply arrives.

use thiserror::Error;

use crate::{BuildError, CredentialError, PipelineError, TransportError};

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Coarse classification of a failed dispatch, recorded on log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The discriminator was missing or named no registered operation.
    UnknownOperation,
    /// Merging or serialising the request failed.
    BuildFailure,
    /// The network call was rejected or answered with a non-success status.
    TransportFailure,
    /// A pipeline step rejected its input.
    PipelineFailure,
    /// The credential store could not list the caller's jar.
    CredentialFailure,
    /// An invocable operation reported a failure.
    OperationFailure,
}

impl ErrorKind {
    /// Stable snake_case label used as the `kind` field of log events.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::BuildFailure => "build_failure",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::PipelineFailure => "pipeline_failure",
            ErrorKind::CredentialFailure => "credential_failure",
            ErrorKind::OperationFailure => "operation_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

/// Errors that end one dispatch without a reply.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The message carried no discriminator.
    #[error("message does not name an operation")]
    MissingOperation,

    /// The discriminator named an operation the registry does not know.
    #[error("cannot find operation '{name}'")]
    UnknownOperation {
        /// The name as it appeared in the message.
        name: String,
    },

    #[error("failed to build request: {0}")]
    Build(#[from] BuildError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("pipeline failure: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("credential lookup failed: {0}")]
    Credential(#[from] CredentialError),

    /// Returned by [`crate::Invocable`] implementations.
    #[error("operation failed: {message}")]
    Operation {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl DispatchError {
    /// Convenience constructor for invocable operations.
    pub fn operation(message: impl Into<String>) -> Self {
        DispatchError::Operation {
            message: message.into(),
        }
    }

    /// Classifies this error for logging.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::MissingOperation | DispatchError::UnknownOperation { .. } => {
                ErrorKind::UnknownOperation
            }
            DispatchError::Build(_) => ErrorKind::BuildFailure,
            DispatchError::Transport(_) => ErrorKind::TransportFailure,
            DispatchError::Pipeline(_) => ErrorKind::PipelineFailure,
            DispatchError::Credential(_) => ErrorKind::CredentialFailure,
            DispatchError::Operation { .. } => ErrorKind::OperationFailure,
        }
    }
}
