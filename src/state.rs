//! Transfer finite-state-machine types.
//!
//! State transitions are driven by [`crate::transfer`]; this module only names
//! the states so they can be inspected and logged.
//!
//! ```text
//!  download:  Start ─RRQ─▶ AwaitingBlock(1) ─DATA n─▶ AwaitingBlock(n+1) ─short DATA─▶ Completed
//!                              │  ▲
//!                              │  └── duplicate DATA (re-ACK, no advance)
//!                              └───── timeout ─────────────────────────────────────▶ Failed
//!
//!  upload:    Start ─WRQ─▶ AwaitingAck(1) ─ACK n─▶ AwaitingAck(n+1) ─ACK of short block─▶ Completed
//!                              │  ▲
//!                              │  └── timeout (retransmit same DATA)
//!                              └───── retries exhausted / peer ERROR ──────────────▶ Failed
//! ```

use std::fmt;

/// Which way the file moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read a remote file (`get`).
    Download,
    /// Write a remote file (`put`).
    Upload,
}

/// All possible states of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    /// No request has been sent yet.
    #[default]
    Start,
    /// Waiting for the Data block with this number.
    AwaitingBlock(u16),
    /// Data block with this number is in flight; waiting for its Ack.
    AwaitingAck(u16),
    /// The final block has been written (download) or acknowledged (upload).
    Completed,
    /// The session aborted; the error was returned to the caller.
    Failed,
}

impl TransferState {
    /// `true` once the session can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => f.write_str("download"),
            Direction::Upload => f.write_str("upload"),
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::AwaitingBlock(n) => write!(f, "AwaitingBlock({n})"),
            TransferState::AwaitingAck(n) => write!(f, "AwaitingAck({n})"),
            other => write!(f, "{other:?}"),
        }
    }
}
