//! Upload-side block state for stop-and-wait reliability.
//!
//! [`Sender`] numbers outbound Data blocks and holds the single in-flight
//! datagram.  It does **not** touch the socket;
//! [`crate::transfer::Transfer`] calls these methods and owns the actual
//! send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** Data block is in flight at any moment (`unacked`).
//! - A new block may only be sent once `unacked` is `None`.
//! - On matching ACK: advance `next_block`; clear `unacked`.
//! - On timeout: increment `tx_count`; resend the same bytes unchanged.

use crate::packet::Packet;

/// A Data datagram that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// Block number carried by the datagram.
    pub block: u16,
    /// Encoded datagram, kept so retransmits are byte-identical.
    pub datagram: Vec<u8>,
    /// Payload length in bytes.
    pub payload_len: usize,
    /// `true` for the short block that ends the transfer.
    pub last: bool,
    /// How many times this datagram has been transmitted (1 = first send).
    pub tx_count: u32,
}

#[derive(Debug)]
pub struct Sender {
    /// Block number for the **next** Data message.  Starts at 1 and wraps.
    pub next_block: u16,
    /// The in-flight block, or `None` when the sender is idle.
    pub unacked: Option<RetransmitEntry>,
    /// Blocks acknowledged so far.
    pub blocks: u64,
    /// Payload bytes acknowledged so far.
    pub bytes: u64,
    /// Retransmissions across the whole transfer.
    pub retransmits: u64,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

impl Sender {
    pub fn new() -> Self {
        Self {
            next_block: 1,
            unacked: None,
            blocks: 0,
            bytes: 0,
            retransmits: 0,
        }
    }

    /// Build the Data message for the next block.
    ///
    /// The caller encodes it, sends it, then calls [`record_sent`](Self::record_sent).
    pub fn build_data_packet(&self, payload: Vec<u8>) -> Packet {
        Packet::Data {
            block: self.next_block,
            payload,
        }
    }

    /// Move an encoded Data datagram into the in-flight slot (first transmission).
    pub fn record_sent(&mut self, datagram: Vec<u8>, payload_len: usize, last: bool) {
        debug_assert!(
            self.unacked.is_none(),
            "record_sent called while a block is already in flight"
        );
        self.unacked = Some(RetransmitEntry {
            block: self.next_block,
            datagram,
            payload_len,
            last,
            tx_count: 1,
        });
    }

    /// Process an inbound ACK number.
    ///
    /// Returns the acknowledged entry if `block` matches the in-flight block;
    /// `None` for a stale, duplicate, or unexpected ACK.
    pub fn on_ack(&mut self, block: u16) -> Option<RetransmitEntry> {
        if self.unacked.as_ref().map(|e| e.block) != Some(block) {
            return None;
        }
        let entry = self.unacked.take()?;
        self.next_block = self.next_block.wrapping_add(1);
        self.blocks += 1;
        self.bytes += entry.payload_len as u64;
        Some(entry)
    }

    /// Count a retransmission of the in-flight block.
    pub fn on_retransmit(&mut self) {
        if let Some(ref mut e) = self.unacked {
            e.tx_count += 1;
            self.retransmits += 1;
        }
    }

    /// The datagram waiting for an ACK, if any.
    pub fn in_flight(&self) -> Option<&RetransmitEntry> {
        self.unacked.as_ref()
    }
}
