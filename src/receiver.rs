//! Download-side block sequencing.
//!
//! [`Receiver`] decides what to do with each inbound Data block: accept it,
//! re-acknowledge it as a duplicate, or ignore it.  It does **not** touch the
//! socket or the output file; [`crate::transfer::Transfer`] owns the loop and
//! acts on the returned [`Disposition`].
//!
//! Block numbers are 16-bit and wrap; "behind" is decided in wrap-around
//! space so a transfer that rolls past 65535 keeps suppressing duplicates.

use crate::packet::BLOCK_SIZE;

/// Returns `true` when block `a` lies strictly behind `b` in wrap-around space.
///
/// Valid while the two numbers are less than half the sequence space apart,
/// which lockstep transfer guarantees.
#[inline]
pub fn block_before(a: u16, b: u16) -> bool {
    let diff = b.wrapping_sub(a);
    diff != 0 && diff <= u16::MAX / 2
}

/// What the transfer loop should do with a Data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The expected block: write it and ACK it.  `last` is set for a short block.
    Accept { last: bool },
    /// A retransmit of an already-accepted block: ACK it again, write nothing.
    Duplicate,
    /// A block from the future: ignore it.
    Ahead,
}

#[derive(Debug)]
pub struct Receiver {
    /// Number of the next block to accept.
    pub expected: u16,
    /// Blocks accepted so far.
    pub blocks: u64,
    /// Payload bytes accepted so far.
    pub bytes: u64,
    /// Duplicate blocks re-acknowledged.
    pub duplicates: u64,
    /// Set once the short final block has been accepted.
    pub finished: bool,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    pub fn new() -> Self {
        Self {
            expected: 1,
            blocks: 0,
            bytes: 0,
            duplicates: 0,
            finished: false,
        }
    }

    /// Classify an inbound Data block carrying `len` payload bytes.
    ///
    /// On [`Disposition::Accept`] the counters advance; `expected` moves on
    /// unless this was the final block.
    pub fn on_data(&mut self, block: u16, len: usize) -> Disposition {
        if block == self.expected && !self.finished {
            self.blocks += 1;
            self.bytes += len as u64;
            let last = len < BLOCK_SIZE;
            if last {
                self.finished = true;
            } else {
                self.expected = self.expected.wrapping_add(1);
            }
            Disposition::Accept { last }
        } else if block_before(block, self.expected) || (self.finished && block == self.expected)
        {
            self.duplicates += 1;
            Disposition::Duplicate
        } else {
            Disposition::Ahead
        }
    }
}
