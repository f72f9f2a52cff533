//! Incremental generation output.
//!
//! A [`DeltaStream`] is the receiving half of a bounded channel fed by a
//! background task that decodes the provider's streaming body. Dropping the
//! stream closes the channel; the decoder notices on its next send and stops
//! reading the upstream response.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error_handler::{AiLlmError, Result};

/// Sending half handed to the decoder task.
pub type DeltaSender = mpsc::Sender<Result<String>>;

/// Ordered text deltas of one generation.
pub struct DeltaStream {
    rx: mpsc::Receiver<Result<String>>,
}

impl DeltaStream {
    /// Creates a connected sender/stream pair with the given buffer size.
    pub fn channel(buffer: usize) -> (DeltaSender, DeltaStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, DeltaStream { rx })
    }

    /// Stream that yields the given deltas and then ends.
    pub fn from_deltas<I, S>(deltas: I) -> DeltaStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<Result<String>> = deltas.into_iter().map(|d| Ok(d.into())).collect();
        Self::from_results(items)
    }

    /// Stream that yields the given items (deltas or errors) and then ends.
    pub fn from_results(items: Vec<Result<String>>) -> DeltaStream {
        let (tx, stream) = Self::channel(items.len() + 1);
        for item in items {
            // Capacity covers every item, so `try_send` cannot fail on a full buffer.
            let _ = tx.try_send(item);
        }
        stream
    }

    /// Drains the stream into one string, failing on the first error.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(item) = self.next().await {
            out.push_str(&item?);
        }
        Ok(out)
    }
}

impl Stream for DeltaStream {
    type Item = std::result::Result<String, AiLlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Splits a byte stream into complete lines across chunk boundaries.
///
/// Bytes are buffered until a `\n` arrives, so multi-byte UTF-8 sequences
/// split between chunks are decoded intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Appends a chunk and returns every line it completed (without `\r\n`).
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Remaining bytes after the body ended without a final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Outcome of decoding one streamed line.
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    Delta(String),
    Done,
    Skip,
}
