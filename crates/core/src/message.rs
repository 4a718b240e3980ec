//! Inbound messages and the single-use reply channel.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;

/// Reserved message key naming the operation to invoke.
pub const OPERATION_FIELD: &str = "contentScriptQuery";

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message from an unprivileged caller.
///
/// On the wire this is one JSON object: the [`OPERATION_FIELD`] key names the
/// operation, every other key is an extra field folded into the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Message {
    operation: Option<String>,
    fields: Map<String, Value>,
}

impl Message {
    /// Creates a message for the named operation with no extra fields.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            fields: Map::new(),
        }
    }

    /// Adds an extra field. A later value for the same key replaces the earlier one.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Interprets an arbitrary JSON value as a message.
    ///
    /// Anything other than an object yields a message with no operation.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from(map),
            _ => Self::default(),
        }
    }

    /// The operation named by the discriminator, if present and non-empty.
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// The extra fields, without the discriminator.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for Message {
    fn from(mut fields: Map<String, Value>) -> Self {
        let operation = match fields.remove(OPERATION_FIELD) {
            Some(Value::String(name)) if !name.is_empty() => Some(name),
            _ => None,
        };
        Self { operation, fields }
    }
}

impl From<Message> for Map<String, Value> {
    fn from(message: Message) -> Self {
        let mut map = Map::new();
        if let Some(operation) = message.operation {
            map.insert(OPERATION_FIELD.to_string(), Value::String(operation));
        }
        map.extend(message.fields);
        map
    }
}

// ---------------------------------------------------------------------------
// Reply channel
// ---------------------------------------------------------------------------

type ReplyFn = Box<dyn FnOnce(Value) + Send>;

/// Single-use callback that carries a result back to the caller.
///
/// Clones share the same slot: the first [`Reply::send`] through any clone
/// delivers, every later call is dropped and reported as `false`. A reply
/// that is never sent is also valid; the caller simply never hears back.
#[derive(Clone)]
pub struct Reply {
    slot: Arc<Mutex<Option<ReplyFn>>>,
}

impl Reply {
    /// Wraps a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Value) + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// Creates a reply whose value arrives on the returned receiver.
    ///
    /// The receiver resolves with an error if every clone of the reply is
    /// dropped without sending.
    pub fn channel() -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let reply = Self::new(move |value| {
            // The receiver may already be gone; there is nobody left to tell.
            let _ = tx.send(value);
        });
        (reply, rx)
    }

    /// Delivers `value`. Returns `false` if the reply was already used.
    pub fn send(&self, value: Value) -> bool {
        let callback = self.slot.lock().take();
        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => {
                tracing::warn!("reply already sent; dropping value");
                false
            }
        }
    }

    /// Returns `true` once a value has been sent.
    pub fn is_spent(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply")
            .field("spent", &self.is_spent())
            .finish()
    }
}
