//! Retransmit budget for the upload side.
//!
//! TFTP is lockstep, so there is at most one datagram to retransmit and the
//! wait window is fixed.  [`RetransmitTimer`] therefore carries no RTT
//! estimate; it counts consecutive timeouts for the in-flight block and says
//! when the budget is spent.

use std::time::Duration;

use crate::config::TransferConfig;

#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    /// Receive wait for every attempt.
    pub timeout: Duration,
    /// Retransmissions allowed before giving up.
    pub max_retries: u32,
    /// Consecutive timeouts observed for the current block.
    timeouts: u32,
}

impl RetransmitTimer {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            timeouts: 0,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.timeout, config.max_retries)
    }

    /// Record a timeout.  Returns `true` if a retransmission is still allowed.
    pub fn on_timeout(&mut self) -> bool {
        self.timeouts = self.timeouts.saturating_add(1);
        self.timeouts <= self.max_retries
    }

    /// Start counting afresh for a new block.
    pub fn reset(&mut self) {
        self.timeouts = 0;
    }

    /// Consecutive timeouts since the last [`reset`](Self::reset).
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }
}
