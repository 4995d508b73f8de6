//! Session-level error taxonomy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::packet::{ErrorCode, PacketError};

/// Every way a transfer can end other than [`Completed`](crate::state::TransferState::Completed).
#[derive(Debug, Error)]
pub enum TransferError {
    /// A datagram from the peer could not be decoded, or an outbound message
    /// could not be encoded.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] PacketError),

    /// No usable datagram arrived within the wait window.
    #[error("transfer timed out waiting on block {block} after {attempts} attempt(s)")]
    TransferTimeout { block: u16, attempts: u32 },

    /// The local upload source could not be opened.
    #[error("source file {} not found: {source}", path.display())]
    SourceFileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The peer aborted the transfer with an Error message.
    #[error("TFTP error from peer: {} {message}", code.description())]
    PeerProtocolError { code: ErrorCode, message: String },

    /// The host name could not be resolved to a socket address.
    #[error("cannot resolve {0}")]
    Resolve(String),

    /// Local file or socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
