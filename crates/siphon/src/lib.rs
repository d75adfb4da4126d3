//! # Siphon
//!
//! Background descriptor reader: drains bytes from an open descriptor on a
//! tokio task, forwards each chunk to a [`ChunkConsumer`], and exposes the
//! lifecycle through awaitable signals.
//!
//! ## Lifecycle (normative)
//!
//! ```text
//! NotStarted -> Reading -> Terminating -> TerminatedNormally
//!                      \-> TerminatedNormally     (EOF)
//!                      \-> TerminatedAbnormally   (read error)
//! ```
//!
//! - State observations never regress along this graph.
//! - The descriptor is closed exactly once, by the drain loop, regardless of
//!   whether termination was stop-initiated, EOF-initiated, or
//!   error-initiated — and always before the completion signal resolves.
//! - `start_reading` is strict: a second call is an error, never a silent
//!   duplicate loop.
//! - `stop_reading` resolves only once the loop has actually finished;
//!   concurrent callers all resolve to the same terminal state.
//! - Dropping a reader without stopping it still shuts the loop down and
//!   closes the descriptor.
//!
//! ## Backpressure
//!
//! The loop awaits the consumer before issuing the next read, so at most one
//! chunk is in flight; a slow consumer slows the reads, it never grows a
//! buffer.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use siphon::{ChannelConsumer, ConsumerItem, FileReader};
//!
//! let (consumer, rx) = ChannelConsumer::bounded(8);
//! let reader = FileReader::from_path("/var/log/app.log", Arc::new(consumer)).await?;
//! reader.start_reading().await?;
//! while let Ok(ConsumerItem::Data(chunk)) = rx.recv().await {
//!     println!("{} bytes", chunk.len());
//! }
//! reader.stop_reading().await?;
//! ```

#![forbid(unsafe_code)]

mod consumer;
mod drain;
mod error;
mod reader;
mod signal;
mod state;

pub mod testing;

pub use consumer::{ChannelConsumer, ChunkConsumer, ConsumerItem};
pub use error::{ReaderError, ReaderResult};
pub use reader::{FileReader, ReaderOptions};
pub use signal::Completion;
pub use state::{ReaderState, Terminal};
