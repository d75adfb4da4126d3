#![forbid(unsafe_code)]

//! Consumer capability: where drained bytes go.
//!
//! The drain loop awaits `consume` before issuing the next read, so a consumer
//! that is slow to return is the backpressure mechanism. Consumers must not
//! block the task for long periods or the loop stalls.

use async_trait::async_trait;
use bytes::Bytes;

/// Receives forwarded byte chunks and the end-of-stream notification.
///
/// Invoked from the reader's background task; implementations must be safe to
/// call from there (`Send + Sync`). The reader shares, never owns, its
/// consumer.
///
/// Normative:
/// - `consume` is called once per non-empty chunk, in read order, and never
///   after the reader's state has left `Reading`.
/// - `end_of_stream` is called at most once, on clean EOF or accepted stop.
///   It is *not* called when the reader terminates on a read error.
#[async_trait]
pub trait ChunkConsumer: Send + Sync + 'static {
    /// Receive the next chunk. The next read is not issued until this returns.
    async fn consume(&self, chunk: Bytes);

    /// The stream ended cleanly; no further chunks will arrive.
    async fn end_of_stream(&self) {}
}

/// Item forwarded by [`ChannelConsumer`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerItem {
    /// A chunk of bytes, in read order.
    Data(Bytes),
    /// Clean end of stream; the channel will carry nothing further.
    EndOfStream,
}

/// A [`ChunkConsumer`] that forwards items into a bounded kanal channel.
///
/// A full channel suspends the drain loop, turning channel capacity into read
/// backpressure. If the receiving side is dropped, remaining items are
/// discarded and the reader keeps draining.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: kanal::AsyncSender<ConsumerItem>,
}

impl ChannelConsumer {
    /// Create a consumer and the receiving end, with `capacity` buffered items.
    pub fn bounded(capacity: usize) -> (Self, kanal::AsyncReceiver<ConsumerItem>) {
        let (tx, rx) = kanal::bounded_async(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ChunkConsumer for ChannelConsumer {
    async fn consume(&self, chunk: Bytes) {
        // Receiver gone means nobody is listening; drop the chunk.
        let _ = self.tx.send(ConsumerItem::Data(chunk)).await;
    }

    async fn end_of_stream(&self) {
        let _ = self.tx.send(ConsumerItem::EndOfStream).await;
    }
}
