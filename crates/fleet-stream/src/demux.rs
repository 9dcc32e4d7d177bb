//! Stream demultiplexer.
//!
//! Wraps the raw byte stream of an execution and yields one
//! [`OutputChunk`] per frame, in arrival order. Bytes that do not yet form a
//! complete frame stay buffered until the next read completes them, so a
//! header split across reads is handled like any other partial frame.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::error::DemuxError;
use crate::frame::{Channel, OutputChunk, split_frame};

/// Lazily demultiplexes a framed byte stream.
///
/// Ends when the source ends with nothing buffered. If the source ends in
/// the middle of a frame the last item is [`DemuxError::Truncated`]. Once it
/// has ended or failed it yields nothing more.
#[derive(Debug)]
pub struct Demuxer<S> {
    source: S,
    buf: BytesMut,
    done: bool,
}

impl<S> Demuxer<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: BytesMut::new(),
            done: false,
        }
    }

    /// Drain the stream into per-channel strings.
    pub async fn collect_output(mut self) -> Result<ExecOutput, DemuxError> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            match chunk.channel {
                Channel::Stdout => stdout.extend_from_slice(&chunk.data),
                Channel::Stderr => stderr.extend_from_slice(&chunk.data),
            }
        }
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

impl<S> Stream for Demuxer<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = Result<OutputChunk, DemuxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            if let Some(chunk) = split_frame(&mut this.buf) {
                return Poll::Ready(Some(Ok(chunk)));
            }

            match ready!(Pin::new(&mut this.source).poll_next(cx)) {
                Some(Ok(bytes)) => this.buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                None => {
                    this.done = true;
                    if this.buf.is_empty() {
                        return Poll::Ready(None);
                    }
                    let buffered = this.buf.len();
                    this.buf.clear();
                    return Poll::Ready(Some(Err(DemuxError::Truncated { buffered })));
                }
            }
        }
    }
}

/// Fully collected output of an execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}
