//! `tftp-client`: a lockstep TFTP client (RFC 1350) over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐                ┌──────────┐
//!  │  Sender  │  (upload)      │ Receiver │  (download)
//!  └────┬─────┘                └─────┬────┘
//!       │                            │
//!  ┌────▼────────────────────────────▼─┐
//!  │             Transfer              │
//!  │  (owns FSM state, peer, config)   │
//!  └────┬──────────────────────────────┘
//!       │ encoded Packets
//!  ┌────▼──────┐
//!  │ Transport │  (tokio UdpSocket, or a simulator / test double)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (serialise / deserialise)
//! - [`transfer`]: download and upload state machines
//! - [`receiver`]: download-side block sequencing and duplicate detection
//! - [`sender`]: upload-side in-flight block and ACK matching
//! - [`state`]: finite-state-machine types
//! - [`timer`]: retransmit budget
//! - [`config`]: session parameters
//! - [`socket`]: transport trait and async UDP socket
//! - [`simulator`]: lossy / duplicating transport for testing
//! - [`client`]: host resolution and one-call `get` / `put`
//! - [`error`]: session error taxonomy

pub mod client;
pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;
pub mod transfer;

pub use config::TransferConfig;
pub use error::TransferError;
pub use packet::{ErrorCode, Mode, Packet, PacketError, BLOCK_SIZE};
pub use socket::{Socket, SocketError, Transport};
pub use state::{Direction, TransferState};
pub use transfer::{Transfer, TransferStats};
