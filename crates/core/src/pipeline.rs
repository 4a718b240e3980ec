//! Response pipelines.
//!
//! A [`Pipeline`] is an immutable, ordered list of [`Step`]s applied to the
//! raw network response. Each step receives the value produced by the previous
//! one. The reserved [`Step::Deliver`] hands the current value to the caller's
//! [`Reply`] instead of passing it on; it may appear at most once and only as
//! the final step, which [`Pipeline::new`] enforces.
//!
//! Two canonical shapes cover most operations:
//!
//! | Preset | Steps | Result reaches the caller via |
//! |--------|-------|-------------------------------|
//! | [`Pipeline::json_data`] | parse → identity | the dispatch future |
//! | [`Pipeline::json_deliver`] | parse → deliver | the reply channel |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{RawResponse, Reply};

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// The value flowing between pipeline steps.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The unparsed network response.
    Response(RawResponse),
    /// Structured data produced by a parse step or a transform.
    Json(Value),
}

impl Payload {
    /// Returns the structured value, if the payload has been parsed.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Response(_) => None,
        }
    }

    /// Converts the payload into something a reply channel can carry.
    ///
    /// An unparsed response becomes its body text.
    pub fn into_value(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Response(response) => Value::String(response.text()),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A step rejected its input.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step '{step}' could not parse the response body: {source}")]
    Parse {
        step: String,
        #[source]
        source: serde_json::Error,
    },

    /// A step that inspects structured fields ran before any parse step.
    #[error("step '{step}' needs structured data but received a raw response")]
    NotParsed { step: String },

    /// A parse step received data that was already structured.
    #[error("step '{step}' expects a raw response but received structured data")]
    AlreadyParsed { step: String },

    /// Failure reported by a custom transform.
    #[error("step '{step}' failed: {message}")]
    Step { step: String, message: String },
}

impl PipelineError {
    /// Convenience constructor for custom transforms.
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Step {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// A step list that violates the deliver-last rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineDefinitionError {
    #[error("deliver step at position {position} must be the last step (pipeline has {len} steps)")]
    DeliverNotLast { position: usize, len: usize },
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Boxed future returned by a custom transform.
pub type StepFuture = Pin<Box<dyn Future<Output = Result<Payload, PipelineError>> + Send>>;

type TransformFn = Arc<dyn Fn(Payload) -> StepFuture + Send + Sync>;

/// A named, caller-supplied async transform.
#[derive(Clone)]
pub struct Transform {
    name: String,
    func: TransformFn,
}

impl Transform {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Transform").field(&self.name).finish()
    }
}

/// One stage of a [`Pipeline`].
///
/// Catalog files name the built-in steps in snake_case: `"parse_json"`,
/// `"identity"`, `"deliver"`, or `{ "select": "/data" }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Parses the raw response body as JSON.
    ParseJson,
    /// Returns its input unchanged.
    Identity,
    /// Replaces the value with the node at a JSON pointer, or `null` if absent.
    Select(String),
    /// Sends the current value through the reply channel.
    Deliver,
    #[serde(skip)]
    Transform(Transform),
}

impl Step {
    pub fn select(pointer: impl Into<String>) -> Self {
        Step::Select(pointer.into())
    }

    /// A custom async transform.
    pub fn transform<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload, PipelineError>> + Send + 'static,
    {
        let func: TransformFn = Arc::new(move |payload| Box::pin(f(payload)));
        Step::Transform(Transform {
            name: name.into(),
            func,
        })
    }

    /// A custom synchronous transform.
    pub fn map<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Payload) -> Result<Payload, PipelineError> + Send + Sync + 'static,
    {
        Self::transform(name, move |payload| std::future::ready(f(payload)))
    }

    /// Label used in errors and log events.
    pub fn name(&self) -> &str {
        match self {
            Step::ParseJson => "parse_json",
            Step::Identity => "identity",
            Step::Select(_) => "select",
            Step::Deliver => "deliver",
            Step::Transform(t) => t.name(),
        }
    }

    fn is_deliver(&self) -> bool {
        matches!(self, Step::Deliver)
    }

    async fn apply(&self, input: Payload) -> Result<Payload, PipelineError> {
        match self {
            Step::ParseJson => match input {
                Payload::Response(response) => {
                    response
                        .json()
                        .map(Payload::Json)
                        .map_err(|source| PipelineError::Parse {
                            step: self.name().to_string(),
                            source,
                        })
                }
                Payload::Json(_) => Err(PipelineError::AlreadyParsed {
                    step: self.name().to_string(),
                }),
            },
            Step::Identity | Step::Deliver => Ok(input),
            Step::Select(pointer) => match input {
                Payload::Json(value) => Ok(Payload::Json(
                    value.pointer(pointer).cloned().unwrap_or(Value::Null),
                )),
                Payload::Response(_) => Err(PipelineError::NotParsed {
                    step: self.name().to_string(),
                }),
            },
            Step::Transform(t) => (t.func)(input).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// An immutable, validated sequence of steps.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Vec<Step>")]
pub struct Pipeline {
    steps: Arc<[Step]>,
}

impl Pipeline {
    /// Validates and freezes a step list.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDefinitionError::DeliverNotLast`] if a deliver step
    /// appears anywhere but the final position.
    pub fn new(steps: Vec<Step>) -> Result<Self, PipelineDefinitionError> {
        let len = steps.len();
        if let Some(position) = steps
            .iter()
            .position(Step::is_deliver)
            .filter(|&p| p + 1 != len)
        {
            return Err(PipelineDefinitionError::DeliverNotLast { position, len });
        }
        Ok(Self {
            steps: steps.into(),
        })
    }

    /// Parse the body as JSON and resolve the dispatch future with it.
    pub fn json_data() -> Self {
        Self {
            steps: Arc::new([Step::ParseJson, Step::Identity]),
        }
    }

    /// Parse the body as JSON and send it through the reply channel.
    pub fn json_deliver() -> Self {
        Self {
            steps: Arc::new([Step::ParseJson, Step::Deliver]),
        }
    }

    /// Send the unparsed body text through the reply channel.
    pub fn deliver() -> Self {
        Self {
            steps: Arc::new([Step::Deliver]),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn ends_in_deliver(&self) -> bool {
        self.steps.last().is_some_and(Step::is_deliver)
    }

    /// Runs every step in order.
    ///
    /// Returns `Ok(None)` once a deliver step has sent the value through
    /// `reply`. Without a reply channel the deliver step passes its input
    /// through unchanged, so nobody listening on a callback ever sees it.
    ///
    /// # Errors
    ///
    /// Stops at the first step that rejects its input.
    pub async fn run(
        &self,
        initial: Payload,
        reply: Option<&Reply>,
    ) -> Result<Option<Payload>, PipelineError> {
        let mut current = initial;
        for (index, step) in self.steps.iter().enumerate() {
            if step.is_deliver() {
                if let Some(reply) = reply {
                    reply.send(current.into_value());
                    return Ok(None);
                }
                tracing::debug!(index, "no reply channel; deliver step passes value through");
                continue;
            }
            tracing::trace!(index, step = step.name(), "running pipeline step");
            current = step.apply(current).await?;
        }
        Ok(Some(current))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::json_data()
    }
}

impl TryFrom<Vec<Step>> for Pipeline {
    type Error = PipelineDefinitionError;

    fn try_from(steps: Vec<Step>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}
