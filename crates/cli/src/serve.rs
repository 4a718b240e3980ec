//! The NDJSON message loop.
//!
//! Each input line is an [`Envelope`]: the message, the sender the message is
//! attributed to, and whether the caller listens on a reply channel. Every
//! envelope is dispatched concurrently. A value delivered through the reply
//! channel, or returned by the operation, becomes one [`Output`] line. A
//! dispatch that fails produces no line at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_core::{CallerIdentity, Dispatcher, Message, Reply};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One inbound line.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Echoed back on every output the envelope produces.
    #[serde(default)]
    pub id: Option<Value>,
    pub message: Message,
    #[serde(default)]
    pub sender: Option<CallerIdentity>,
    /// The caller listens on a reply channel.
    #[serde(default)]
    pub reply: bool,
}

/// How an output value left the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Reply,
    Result,
}

/// One outbound line.
#[derive(Debug, Serialize)]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub kind: OutputKind,
    pub value: Value,
    pub replied_at: DateTime<Utc>,
}

impl Output {
    fn new(id: Option<Value>, kind: OutputKind, value: Value) -> Self {
        Self {
            id,
            kind,
            value,
            replied_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Reads envelopes from `input` until end of stream, writing outputs to `output`.
///
/// Returns `output` once every dispatch has finished and its lines are written.
///
/// # Errors
///
/// Fails only on I/O errors; malformed lines are logged and skipped.
pub async fn serve<R, W>(dispatcher: Arc<Dispatcher>, input: R, output: W) -> anyhow::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outputs(rx, output));
    let mut dispatches = JoinSet::new();

    let mut lines = input.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed envelope");
                continue;
            }
        };
        dispatches.spawn(handle(Arc::clone(&dispatcher), envelope, tx.clone()));
    }

    while let Some(joined) = dispatches.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "dispatch task aborted");
        }
    }
    drop(tx);

    let output = writer.await??;
    tracing::info!(lines = line_no, "input closed");
    Ok(output)
}

async fn handle(
    dispatcher: Arc<Dispatcher>,
    envelope: Envelope,
    tx: mpsc::UnboundedSender<Output>,
) {
    let Envelope {
        id,
        message,
        sender,
        reply,
    } = envelope;

    let (reply, replied) = if reply {
        let (reply, rx) = Reply::channel();
        (Some(reply), Some(rx))
    } else {
        (None, None)
    };

    if let Some(value) = dispatcher.dispatch(message, sender, reply).await {
        let _ = tx.send(Output::new(id.clone(), OutputKind::Result, value));
    }
    // Resolves once the reply is sent, or errors once every handle is dropped unsent.
    if let Some(rx) = replied {
        if let Ok(value) = rx.await {
            let _ = tx.send(Output::new(id, OutputKind::Reply, value));
        }
    }
}

async fn write_outputs<W>(
    mut rx: mpsc::UnboundedReceiver<Output>,
    mut output: W,
) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(out) = rx.recv().await {
        let mut line = serde_json::to_vec(&out)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(output)
}
