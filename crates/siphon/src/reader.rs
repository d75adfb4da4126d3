#![forbid(unsafe_code)]

//! The reader aggregate: construction, start/stop, state inspection.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::consumer::ChunkConsumer;
use crate::drain::DrainLoop;
use crate::error::{ReaderError, ReaderResult};
use crate::signal::{Completion, Signal};
use crate::state::{ReaderState, StateCell, Terminal};

/// Everything the client handle and the drain loop share.
pub(crate) struct Shared {
    pub(crate) state: StateCell,
    pub(crate) started: Signal<()>,
    pub(crate) completion: Signal<Terminal>,
    pub(crate) failure: OnceLock<Arc<ReaderError>>,
    pub(crate) cancel: CancellationToken,
}

/// Construction options for [`FileReader`].
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Read buffer size in bytes. Zero means the default (32 KiB).
    pub read_buffer_size: usize,
    /// Optional parent cancellation token. Cancelling it stops the reader;
    /// the reader stopping never propagates back to the parent.
    pub cancel: Option<CancellationToken>,
}

impl ReaderOptions {
    const DEFAULT_READ_BUFFER_SIZE: usize = 32 * 1024;

    fn read_buffer_size(&self) -> usize {
        if self.read_buffer_size == 0 {
            Self::DEFAULT_READ_BUFFER_SIZE
        } else {
            self.read_buffer_size
        }
    }

    fn token(&self) -> CancellationToken {
        match &self.cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        }
    }
}

/// Reads a descriptor in the background, forwarding chunks to a consumer.
///
/// The reader owns the descriptor exclusively: nothing else may read from or
/// close it after construction. The consumer is shared, never owned.
///
/// ## Lifecycle (normative)
///
/// `NotStarted -> Reading -> (Terminating ->) TerminatedNormally | TerminatedAbnormally`
///
/// - [`start_reading`](Self::start_reading) launches the drain loop; it is
///   **not** idempotent: a second call fails with
///   [`ReaderError::InvalidState`] (or [`ReaderError::AlreadyTerminated`]
///   once the reader has finished). There is never a silent duplicate loop.
/// - [`stop_reading`](Self::stop_reading) requests termination and resolves
///   only once the loop has actually finished; after termination it is
///   idempotent and returns the existing terminal state.
/// - Dropping a reader without ever stopping it is safe: drop cancels the
///   loop, which closes the descriptor and resolves any outstanding
///   [`Completion`] handles. (A reader dropped before `start_reading` closes
///   the descriptor too, but its completion signal never resolves — there was
///   no reading to complete.)
///
/// The descriptor is closed exactly once, by the loop, and always before the
/// completion signal resolves.
pub struct FileReader<D> {
    shared: Arc<Shared>,
    descriptor: Mutex<Option<D>>,
    consumer: Arc<dyn ChunkConsumer>,
    read_buffer_size: usize,
}

impl<D> FileReader<D>
where
    D: AsyncRead + Send + Unpin + 'static,
{
    /// Create a reader from an already-open descriptor.
    ///
    /// The descriptor becomes owned by the reader and will be closed when the
    /// drain loop finalizes (or when a never-started reader is dropped).
    pub fn from_descriptor(descriptor: D, consumer: Arc<dyn ChunkConsumer>) -> Self {
        Self::from_descriptor_with_options(descriptor, consumer, ReaderOptions::default())
    }

    /// [`from_descriptor`](Self::from_descriptor) with explicit options.
    pub fn from_descriptor_with_options(
        descriptor: D,
        consumer: Arc<dyn ChunkConsumer>,
        options: ReaderOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: StateCell::new(),
                started: Signal::new(),
                completion: Signal::new(),
                failure: OnceLock::new(),
                cancel: options.token(),
            }),
            descriptor: Mutex::new(Some(descriptor)),
            consumer,
            read_buffer_size: options.read_buffer_size(),
        }
    }

    /// Launch the drain loop.
    ///
    /// Resolves once the read channel is registered (the loop is running and
    /// about to issue its first read) — not at termination.
    ///
    /// Errors with [`ReaderError::InvalidState`] unless the state is
    /// `NotStarted`; with [`ReaderError::AlreadyTerminated`] if the reader
    /// already finished.
    pub async fn start_reading(&self) -> ReaderResult<()> {
        if let Err(observed) = self.shared.state.begin_reading() {
            return Err(match observed.terminal() {
                Some(terminal) => ReaderError::AlreadyTerminated(terminal),
                None => ReaderError::InvalidState {
                    operation: "start_reading",
                    state: observed,
                },
            });
        }

        // Winning the CAS above is the exclusive license to take the
        // descriptor; it is present unless construction was bypassed.
        let descriptor = self.descriptor.lock().take();
        let Some(descriptor) = descriptor else {
            return Err(ReaderError::InvalidState {
                operation: "start_reading",
                state: self.shared.state.load(),
            });
        };

        debug!("starting drain loop");
        tokio::spawn(
            DrainLoop::new(
                descriptor,
                Arc::clone(&self.consumer),
                Arc::clone(&self.shared),
                self.read_buffer_size,
            )
            .run(),
        );

        self.shared.started.wait().await;
        Ok(())
    }

    /// Request termination and wait for the loop to actually finish.
    ///
    /// Safe to call concurrently from any number of callers, and concurrently
    /// with the loop reaching natural EOF: exactly one termination cause wins,
    /// and every caller resolves to the same terminal state. After
    /// termination this is idempotent and returns immediately.
    ///
    /// The call only triggers the cancellation token; the `Reading ->
    /// Terminating` edge is written by the drain loop when it observes the
    /// cancellation, so the state never visibly leaves `Reading` while a
    /// chunk delivery is still possible.
    ///
    /// Errors with [`ReaderError::InvalidState`] if the reader was never
    /// started.
    pub async fn stop_reading(&self) -> ReaderResult<Terminal> {
        let observed = self.shared.state.load();
        if observed == ReaderState::NotStarted {
            return Err(ReaderError::InvalidState {
                operation: "stop_reading",
                state: observed,
            });
        }

        trace!("stop requested");
        self.shared.cancel.cancel();
        Ok(self.shared.completion.wait().await)
    }

    /// Atomic point-in-time read of the lifecycle state.
    pub fn state(&self) -> ReaderState {
        self.shared.state.load()
    }

    /// Wait for termination without requesting it.
    pub async fn completed(&self) -> Terminal {
        self.shared.completion.wait().await
    }

    /// Detached completion handle, valid after the reader is dropped.
    pub fn completion(&self) -> Completion {
        Completion::new(self.shared.completion.clone())
    }

    /// The recorded cause of `TerminatedAbnormally`, if any.
    pub fn failure(&self) -> Option<Arc<ReaderError>> {
        self.shared.failure.get().cloned()
    }
}

impl FileReader<File> {
    /// Open `path` and create a reader over the resulting descriptor.
    pub async fn from_path(
        path: impl AsRef<Path>,
        consumer: Arc<dyn ChunkConsumer>,
    ) -> ReaderResult<Self> {
        Self::from_path_with_options(path, consumer, ReaderOptions::default()).await
    }

    /// [`from_path`](Self::from_path) with explicit options.
    pub async fn from_path_with_options(
        path: impl AsRef<Path>,
        consumer: Arc<dyn ChunkConsumer>,
        options: ReaderOptions,
    ) -> ReaderResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|source| ReaderError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_descriptor_with_options(file, consumer, options))
    }
}

impl<D> std::fmt::Debug for FileReader<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("state", &self.shared.state.load())
            .finish_non_exhaustive()
    }
}

impl<D> Drop for FileReader<D> {
    /// Cancel the loop so a forgotten `stop_reading` still closes the
    /// descriptor and resolves outstanding completion handles.
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
