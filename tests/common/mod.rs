//! Shared test doubles.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tftp_client::{Packet, SocketError, Transport};

/// Address the client sends its initial request to.
pub fn server_addr() -> SocketAddr {
    "127.0.0.1:69".parse().unwrap()
}

/// Address the simulated server answers from (its transfer ID).
pub fn peer_addr() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

/// One scripted inbound event.
pub enum Step {
    Datagram(Vec<u8>, SocketAddr),
    /// A datagram that arrives only after the given delay of real time.
    Delayed(Duration, Vec<u8>, SocketAddr),
    Timeout,
}

/// A [`Transport`] that replays a fixed inbound script and records every send.
///
/// Lockstep transfer makes the peer's replies independent of timing, so the
/// whole conversation can be scripted up front.  Delayed steps play out in
/// real time against the caller's wait.  An exhausted script behaves like a
/// silent network.
#[derive(Default)]
pub struct ScriptedTransport {
    pub inbound: VecDeque<Step>,
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet from the peer's transfer ID.
    pub fn reply(mut self, packet: Packet) -> Self {
        self.inbound
            .push_back(Step::Datagram(packet.encode().unwrap(), peer_addr()));
        self
    }

    /// Queue a packet from an arbitrary address.
    pub fn reply_from(mut self, packet: Packet, from: SocketAddr) -> Self {
        self.inbound
            .push_back(Step::Datagram(packet.encode().unwrap(), from));
        self
    }

    /// Queue raw bytes from the peer.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.inbound
            .push_back(Step::Datagram(bytes.to_vec(), peer_addr()));
        self
    }

    /// Queue a packet from `from` that arrives `delay` after the previous step.
    pub fn reply_after(mut self, delay: Duration, packet: Packet, from: SocketAddr) -> Self {
        self.inbound
            .push_back(Step::Delayed(delay, packet.encode().unwrap(), from));
        self
    }

    pub fn timeout(mut self) -> Self {
        self.inbound.push_back(Step::Timeout);
        self
    }

    /// Every sent datagram decoded, paired with its destination.
    pub fn sent_packets(&self) -> Vec<(Packet, SocketAddr)> {
        self.sent
            .iter()
            .map(|(bytes, dest)| (Packet::decode(bytes).unwrap(), *dest))
            .collect()
    }

    /// Block numbers of every ACK sent.
    pub fn acks(&self) -> Vec<u16> {
        self.sent_packets()
            .into_iter()
            .filter_map(|(p, _)| match p {
                Packet::Ack { block } => Some(block),
                _ => None,
            })
            .collect()
    }
}

impl Transport for ScriptedTransport {
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.sent.push((bytes.to_vec(), dest));
        Ok(())
    }

    async fn recv_from(&mut self, wait: Duration) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        match self.inbound.pop_front() {
            Some(Step::Datagram(bytes, from)) => Ok((bytes, from)),
            Some(Step::Delayed(delay, bytes, from)) => {
                if delay < wait {
                    tokio::time::sleep(delay).await;
                    return Ok((bytes, from));
                }
                // Still in flight when the wait expires.
                tokio::time::sleep(wait).await;
                self.inbound
                    .push_front(Step::Delayed(delay - wait, bytes, from));
                Err(SocketError::Timeout(wait))
            }
            Some(Step::Timeout) | None => Err(SocketError::Timeout(wait)),
        }
    }
}

/// Deterministic file contents of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// `data` split into DATA packets the way a server would send it.
pub fn data_packets(data: &[u8]) -> Vec<Packet> {
    let mut packets: Vec<Packet> = data
        .chunks(tftp_client::BLOCK_SIZE)
        .enumerate()
        .map(|(i, chunk)| Packet::Data {
            block: (i + 1) as u16,
            payload: chunk.to_vec(),
        })
        .collect();
    if data.len() % tftp_client::BLOCK_SIZE == 0 {
        packets.push(Packet::Data {
            block: (packets.len() + 1) as u16,
            payload: Vec::new(),
        });
    }
    packets
}
