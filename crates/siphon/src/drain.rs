#![forbid(unsafe_code)]

//! The background drain loop.
//!
//! One loop per reader, spawned by `start_reading`. It is the exclusive owner
//! of the descriptor from launch to finalize, and finalize is the single point
//! where the descriptor is closed — whichever of the three termination causes
//! (EOF, read error, requested stop) applied.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use crate::consumer::ChunkConsumer;
use crate::error::ReaderError;
use crate::reader::Shared;
use crate::state::Terminal;

/// Why the loop stopped issuing reads.
enum Cause {
    /// Zero-byte read: clean EOF.
    Eof,
    /// Cancellation fired: explicit stop or reader drop.
    Stopped,
    /// A read returned an error.
    Failed(std::io::Error),
}

pub(crate) struct DrainLoop<D> {
    descriptor: D,
    consumer: Arc<dyn ChunkConsumer>,
    shared: Arc<Shared>,
    read_buffer_size: usize,
}

impl<D> DrainLoop<D>
where
    D: AsyncRead + Send + Unpin + 'static,
{
    pub(crate) fn new(
        descriptor: D,
        consumer: Arc<dyn ChunkConsumer>,
        shared: Arc<Shared>,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            descriptor,
            consumer,
            shared,
            read_buffer_size,
        }
    }

    /// Run until EOF, error, or cancellation, then finalize exactly once.
    pub(crate) async fn run(mut self) {
        let cancel = self.shared.cancel.clone();

        // The read channel is set up; unblock start_reading.
        self.shared.started.resolve(());
        trace!("drain loop started");

        let mut buf = BytesMut::with_capacity(self.read_buffer_size);
        let cause = loop {
            buf.reserve(self.read_buffer_size);
            tokio::select! {
                biased;

                // The loop is the only writer of the `Reading -> Terminating`
                // edge, and it stops forwarding before taking it: once the
                // state visibly leaves `Reading`, no chunk follows.
                _ = cancel.cancelled() => {
                    self.shared.state.mark_terminating();
                    trace!("cancellation observed, abandoning pending read");
                    break Cause::Stopped;
                }

                read = self.descriptor.read_buf(&mut buf) => match read {
                    Ok(0) => break Cause::Eof,
                    Ok(n) => {
                        trace!(bytes = n, "forwarding chunk");
                        // Awaiting the consumer before the next read bounds
                        // buffering to one chunk in flight.
                        self.consumer.consume(buf.split().freeze()).await;
                    }
                    Err(err) => break Cause::Failed(err),
                },
            }
        };

        self.finalize(cause).await;
    }

    /// Notify, close, then settle state and completion — in that order, so an
    /// observer woken by the completion signal can rely on the descriptor
    /// being closed and the state being terminal.
    async fn finalize(self, cause: Cause) {
        let Self {
            descriptor,
            consumer,
            shared,
            ..
        } = self;

        let terminal = match cause {
            Cause::Eof | Cause::Stopped => {
                consumer.end_of_stream().await;
                Terminal::Normal
            }
            Cause::Failed(err) => {
                warn!(error = %err, "drain loop read failed");
                let _ = shared.failure.set(Arc::new(ReaderError::Io(err)));
                Terminal::Abnormal
            }
        };

        // The single closure point. No path issues reads after this.
        drop(descriptor);

        shared.state.finalize(terminal);
        shared.completion.resolve(terminal);
        trace!(%terminal, "drain loop finished");
    }
}
