#![forbid(unsafe_code)]

//! Reader lifecycle states and the atomic cell that owns their transitions.
//!
//! `StateCell` is the only mutable memory shared between client tasks and the
//! drain loop. Every transition goes through a compare-exchange against the
//! table below, so observers can never see a regression:
//!
//! ```text
//! NotStarted -> Reading -> Terminating -> TerminatedNormally
//!                      \-> TerminatedNormally     (EOF)
//!                      \-> TerminatedAbnormally   (read error)
//!              Terminating -> TerminatedAbnormally (error won the stop race)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`FileReader`](crate::FileReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReaderState {
    /// Constructed, drain loop not launched.
    NotStarted = 0,
    /// Drain loop running, consumer may receive chunks.
    Reading = 1,
    /// Stop requested, loop has not finished yet.
    Terminating = 2,
    /// Clean EOF or accepted stop.
    TerminatedNormally = 3,
    /// The drain loop hit a read error.
    TerminatedAbnormally = 4,
}

impl ReaderState {
    /// True for the two states after which no further reads occur.
    pub fn is_terminal(self) -> bool {
        self.terminal().is_some()
    }

    /// The terminal value this state corresponds to, if any.
    pub fn terminal(self) -> Option<Terminal> {
        match self {
            Self::TerminatedNormally => Some(Terminal::Normal),
            Self::TerminatedAbnormally => Some(Terminal::Abnormal),
            _ => None,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Reading,
            2 => Self::Terminating,
            3 => Self::TerminatedNormally,
            _ => Self::TerminatedAbnormally,
        }
    }
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not-started",
            Self::Reading => "reading",
            Self::Terminating => "terminating",
            Self::TerminatedNormally => "terminated-normally",
            Self::TerminatedAbnormally => "terminated-abnormally",
        };
        f.write_str(name)
    }
}

/// How a reader finished. The only values a completion signal can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Clean EOF or accepted stop.
    Normal,
    /// A read failed; the cause is retrievable via `FileReader::failure`.
    Abnormal,
}

impl Terminal {
    /// The lifecycle state this terminal value maps to.
    pub fn state(self) -> ReaderState {
        match self {
            Self::Normal => ReaderState::TerminatedNormally,
            Self::Abnormal => ReaderState::TerminatedAbnormally,
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state().fmt(f)
    }
}

/// Atomic holder of a [`ReaderState`] with a closed transition table.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ReaderState::NotStarted as u8))
    }

    pub(crate) fn load(&self) -> ReaderState {
        ReaderState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `NotStarted -> Reading`. Exactly one caller ever wins; everyone else
    /// gets the state they raced against.
    pub(crate) fn begin_reading(&self) -> Result<(), ReaderState> {
        self.0
            .compare_exchange(
                ReaderState::NotStarted as u8,
                ReaderState::Reading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(ReaderState::from_u8)
    }

    /// `Reading -> Terminating`. Written only by the drain loop, when it
    /// observes cancellation: the loop forwards chunks strictly before this
    /// edge, so no chunk is ever delivered once the state has visibly left
    /// `Reading`.
    pub(crate) fn mark_terminating(&self) -> bool {
        self.0
            .compare_exchange(
                ReaderState::Reading as u8,
                ReaderState::Terminating as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `Reading|Terminating -> terminal`. Called exactly once, by the drain
    /// loop, at its single finalize point.
    pub(crate) fn finalize(&self, terminal: Terminal) {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = ReaderState::from_u8(current);
            if state.is_terminal() {
                // Already terminal: the table has no edges out of terminals.
                return;
            }
            match self.0.compare_exchange(
                current,
                terminal.state() as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}
