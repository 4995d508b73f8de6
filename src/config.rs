//! Session configuration.

use std::time::Duration;

use crate::packet::Mode;

/// Well-known TFTP server port.
pub const DEFAULT_PORT: u16 = 69;

/// Receive wait applied to every wait-for-datagram step.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Retransmissions of one Data block before an upload gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Adjustable parameters for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Server port the initial request is sent to.
    pub port: u16,
    /// How long each receive waits before timing out.
    pub timeout: Duration,
    /// Upper bound on consecutive retransmissions of the same Data block.
    pub max_retries: u32,
    /// Mode name written into the request.
    pub mode: Mode,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            mode: Mode::default(),
        }
    }
}

impl TransferConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}
