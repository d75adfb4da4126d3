#![forbid(unsafe_code)]

//! Manual mocks for reader tests.
//!
//! The descriptor side is a scripted `AsyncRead` rather than a mock framework
//! type: the interesting assertions (close-exactly-once, unblock-on-stop) hang
//! off ownership and `Drop`, which scripted values express directly.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};

use crate::consumer::ChunkConsumer;

/// One scripted step of a [`ScriptedDescriptor`].
#[derive(Debug)]
pub enum ReadStep {
    /// Deliver these bytes (split across reads if the buffer is smaller).
    Chunk(Vec<u8>),
    /// Fail the read with this error kind.
    Error(io::ErrorKind),
    /// Never complete. Used to exercise stop/drop unblocking a pending read.
    Stall,
}

/// Observes descriptor closure from the outside.
///
/// Closure is the descriptor being dropped; the probe counts drops so tests
/// can assert the close happened, happened once, and happened before the
/// completion signal resolved.
#[derive(Debug, Clone, Default)]
pub struct CloseProbe(Arc<AtomicUsize>);

impl CloseProbe {
    /// How many times the descriptor has been closed. Anything but 0 or 1 is
    /// a reader bug.
    pub fn close_count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// True once the descriptor has been closed.
    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

/// Scripted in-memory descriptor.
///
/// Plays back its steps in order; an exhausted script reads as EOF.
#[derive(Debug)]
pub struct ScriptedDescriptor {
    steps: VecDeque<ReadStep>,
    probe: CloseProbe,
}

impl ScriptedDescriptor {
    /// Build a descriptor from a script, returning its close probe.
    pub fn new(steps: impl IntoIterator<Item = ReadStep>) -> (Self, CloseProbe) {
        let probe = CloseProbe::default();
        (
            Self {
                steps: steps.into_iter().collect(),
                probe: probe.clone(),
            },
            probe,
        )
    }

    /// Descriptor that delivers each chunk then EOF.
    pub fn with_chunks<C>(chunks: impl IntoIterator<Item = C>) -> (Self, CloseProbe)
    where
        C: Into<Vec<u8>>,
    {
        Self::new(chunks.into_iter().map(|c| ReadStep::Chunk(c.into())))
    }
}

impl AsyncRead for ScriptedDescriptor {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.steps.pop_front() {
            None => Poll::Ready(Ok(())), // no bytes appended: EOF
            Some(ReadStep::Chunk(mut bytes)) => {
                let take = bytes.len().min(buf.remaining());
                let rest = bytes.split_off(take);
                buf.put_slice(&bytes);
                if !rest.is_empty() {
                    this.steps.push_front(ReadStep::Chunk(rest));
                }
                Poll::Ready(Ok(()))
            }
            Some(ReadStep::Error(kind)) => Poll::Ready(Err(io::Error::from(kind))),
            Some(ReadStep::Stall) => {
                // Stay pending forever; only cancellation unblocks the loop.
                this.steps.push_front(ReadStep::Stall);
                Poll::Pending
            }
        }
    }
}

impl Drop for ScriptedDescriptor {
    fn drop(&mut self) {
        self.probe.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// Consumer that records everything it is given.
#[derive(Debug, Default)]
pub struct RecordingConsumer {
    chunks: Mutex<Vec<Bytes>>,
    end_of_stream: AtomicUsize,
}

impl RecordingConsumer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The chunks received so far, in delivery order.
    pub fn chunks(&self) -> Vec<Bytes> {
        self.chunks.lock().clone()
    }

    /// All received bytes, concatenated.
    pub fn bytes(&self) -> Vec<u8> {
        self.chunks
            .lock()
            .iter()
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }

    /// How many end-of-stream notifications arrived. More than one is a
    /// reader bug.
    pub fn end_of_stream_count(&self) -> usize {
        self.end_of_stream.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ChunkConsumer for RecordingConsumer {
    async fn consume(&self, chunk: Bytes) {
        self.chunks.lock().push(chunk);
    }

    async fn end_of_stream(&self) {
        self.end_of_stream.fetch_add(1, Ordering::AcqRel);
    }
}

/// Consumer that sleeps on every chunk, for backpressure tests.
#[derive(Debug)]
pub struct SlowConsumer {
    inner: Arc<RecordingConsumer>,
    delay: std::time::Duration,
}

impl SlowConsumer {
    pub fn new(delay: std::time::Duration) -> (Arc<Self>, Arc<RecordingConsumer>) {
        let inner = RecordingConsumer::new();
        (
            Arc::new(Self {
                inner: Arc::clone(&inner),
                delay,
            }),
            inner,
        )
    }
}

#[async_trait]
impl ChunkConsumer for SlowConsumer {
    async fn consume(&self, chunk: Bytes) {
        tokio::time::sleep(self.delay).await;
        self.inner.consume(chunk).await;
    }

    async fn end_of_stream(&self) {
        self.inner.end_of_stream().await;
    }
}
