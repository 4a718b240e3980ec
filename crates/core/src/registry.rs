//! The operation registry.
//!
//! Operations are registered once at startup through a [`RegistryBuilder`],
//! which validates every descriptor, and then frozen into a [`Registry`] that
//! is only ever read. An entry is either a data-only [`Descriptor`] or an
//! [`Invocable`] escape hatch for operations that do not fit that shape.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{
    CallerIdentity, Descriptor, DescriptorError, DispatchError, Message, OperationName, Reply,
};

// ---------------------------------------------------------------------------
// Invocable operations
// ---------------------------------------------------------------------------

/// An operation implemented in code rather than described as a request.
///
/// The dispatcher hands over the whole message (discriminator stripped), the
/// caller and the reply channel; what happens next is up to the implementation.
/// A returned error is logged by the dispatcher like any other failure.
#[async_trait]
pub trait Invocable: Send + Sync {
    async fn invoke(
        &self,
        message: Message,
        caller: Option<CallerIdentity>,
        reply: Option<Reply>,
    ) -> Result<Option<Value>, DispatchError>;
}

/// Adapts an async closure into an [`Invocable`].
pub struct FnOperation<F>(F);

impl<F> FnOperation<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Invocable for FnOperation<F>
where
    F: Fn(Message, Option<CallerIdentity>, Option<Reply>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, DispatchError>> + Send + 'static,
{
    async fn invoke(
        &self,
        message: Message,
        caller: Option<CallerIdentity>,
        reply: Option<Reply>,
    ) -> Result<Option<Value>, DispatchError> {
        (self.0)(message, caller, reply).await
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// What a name resolves to.
#[derive(Clone)]
pub enum Entry {
    Descriptor(Arc<Descriptor>),
    Invocable(Arc<dyn Invocable>),
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Descriptor(d) => f.debug_tuple("Descriptor").field(d).finish(),
            Entry::Invocable(_) => f.write_str("Invocable"),
        }
    }
}

/// An entry could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("operation name must not be empty")]
    EmptyName,

    #[error("operation '{name}' is already registered")]
    Duplicate { name: OperationName },

    #[error(transparent)]
    Invalid(#[from] DescriptorError),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects and validates entries before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<OperationName, Entry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor after checking its invariants.
    ///
    /// # Errors
    ///
    /// [`RegistryError::EmptyName`], [`RegistryError::Duplicate`], or the
    /// descriptor's own validation failure.
    pub fn descriptor(
        &mut self,
        name: impl Into<String>,
        descriptor: Descriptor,
    ) -> Result<&mut Self, RegistryError> {
        let name = OperationName::new(name).ok_or(RegistryError::EmptyName)?;
        descriptor.validate(name.as_str())?;
        self.insert(name, Entry::Descriptor(Arc::new(descriptor)))
    }

    /// Registers an invocable operation.
    ///
    /// # Errors
    ///
    /// [`RegistryError::EmptyName`] or [`RegistryError::Duplicate`].
    pub fn invocable<I>(
        &mut self,
        name: impl Into<String>,
        operation: I,
    ) -> Result<&mut Self, RegistryError>
    where
        I: Invocable + 'static,
    {
        let name = OperationName::new(name).ok_or(RegistryError::EmptyName)?;
        self.insert(name, Entry::Invocable(Arc::new(operation)))
    }

    /// Registers an async closure as an invocable operation.
    ///
    /// # Errors
    ///
    /// See [`RegistryBuilder::invocable`].
    pub fn function<F, Fut>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: Fn(Message, Option<CallerIdentity>, Option<Reply>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, DispatchError>> + Send + 'static,
    {
        self.invocable(name, FnOperation::new(f))
    }

    /// Registers every descriptor of a catalog.
    ///
    /// # Errors
    ///
    /// Stops at the first entry that fails to register.
    pub fn descriptors<I, S>(&mut self, catalog: I) -> Result<&mut Self, RegistryError>
    where
        I: IntoIterator<Item = (S, Descriptor)>,
        S: Into<String>,
    {
        for (name, descriptor) in catalog {
            self.descriptor(name, descriptor)?;
        }
        Ok(self)
    }

    fn insert(&mut self, name: OperationName, entry: Entry) -> Result<&mut Self, RegistryError> {
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.entries.insert(name, entry);
        Ok(self)
    }

    /// Freezes the registry.
    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Read-only mapping from operation name to [`Entry`].
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<OperationName, Entry>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolves a name. Absence is the not-found signal.
    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<&OperationName> {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        names
    }
}
