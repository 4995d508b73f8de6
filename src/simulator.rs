//! Fault-injecting transport for deterministic loss testing.
//!
//! Real networks drop and duplicate datagrams.  To exercise the timeout and
//! duplicate-suppression paths without depending on actual network
//! conditions, [`Simulator`] wraps any [`Transport`] and applies a
//! configurable fault model:
//!
//! | Fault       | Description                                          |
//! |-------------|------------------------------------------------------|
//! | Loss        | Drop a datagram with probability `loss_rate`.        |
//! | Duplication | Deliver a datagram twice with `duplicate_rate`.      |
//!
//! Faults apply in both directions.  The RNG is seeded so a failing run can be
//! replayed exactly.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::socket::{SocketError, Transport};

/// Configuration for the fault model.
///
/// Probabilities are clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a delivered datagram is delivered a second time.
    pub duplicate_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

/// A fault-injecting wrapper around another transport.
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    rng: StdRng,
    /// Inbound duplicates waiting to be delivered.
    pending: VecDeque<(Vec<u8>, SocketAddr)>,
    /// Datagrams dropped so far, both directions.
    pub dropped: u64,
    /// Datagrams duplicated so far, both directions.
    pub duplicated: u64,
}

impl<T> Simulator<T> {
    pub fn new(inner: T, mut config: SimulatorConfig) -> Self {
        config.loss_rate = config.loss_rate.clamp(0.0, 1.0);
        config.duplicate_rate = config.duplicate_rate.clamp(0.0, 1.0);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng,
            pending: VecDeque::new(),
            dropped: 0,
            duplicated: 0,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn roll_loss(&mut self) -> bool {
        let hit = self.rng.random_bool(self.config.loss_rate);
        if hit {
            self.dropped += 1;
        }
        hit
    }

    fn roll_duplicate(&mut self) -> bool {
        let hit = self.rng.random_bool(self.config.duplicate_rate);
        if hit {
            self.duplicated += 1;
        }
        hit
    }
}

impl<T: Transport + Send> Transport for Simulator<T> {
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        if self.roll_loss() {
            log::debug!("[sim] dropped outbound datagram ({} bytes)", bytes.len());
            return Ok(());
        }
        self.inner.send_to(bytes, dest).await?;
        if self.roll_duplicate() {
            log::debug!("[sim] duplicated outbound datagram");
            self.inner.send_to(bytes, dest).await?;
        }
        Ok(())
    }

    async fn recv_from(&mut self, wait: Duration) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        if let Some(datagram) = self.pending.pop_front() {
            return Ok(datagram);
        }

        // A dropped datagram must not shorten the caller's wait window.
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SocketError::Timeout(wait));
            }
            let datagram = match self.inner.recv_from(remaining).await {
                Err(SocketError::Timeout(_)) => return Err(SocketError::Timeout(wait)),
                other => other?,
            };
            if self.roll_loss() {
                log::debug!("[sim] dropped inbound datagram from {}", datagram.1);
                continue;
            }
            if self.roll_duplicate() {
                log::debug!("[sim] duplicated inbound datagram");
                self.pending.push_back(datagram.clone());
            }
            return Ok(datagram);
        }
    }
}
