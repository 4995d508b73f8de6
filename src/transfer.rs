//! Lockstep transfer engine.
//!
//! A [`Transfer`] owns everything for one directional session: the transport,
//! the peer address, the configuration and the FSM state (see
//! [`crate::state`]).  It coordinates [`crate::receiver::Receiver`] (download)
//! or [`crate::sender::Sender`] (upload) and is the only place that touches
//! the network.
//!
//! # Peer locking
//!
//! The request goes to the server's well-known address.  The server answers
//! from a fresh port (its transfer identifier); the first datagram received
//! fixes that address as the peer for the rest of the session.  Datagrams
//! from any other address get an "Unknown transfer ID" Error and are
//! otherwise ignored.
//!
//! # Failure policy
//!
//! - Download: one timed-out wait is fatal.
//! - Upload: a timed-out wait retransmits the in-flight Data datagram, up to
//!   [`TransferConfig::max_retries`] times.
//! - An Error message from the peer aborts either direction.
//! - An undecodable datagram from the peer aborts either direction.
//! - Anything else unexpected (future blocks, stray ACKs) is logged and ignored.

use std::io;
use std::net::SocketAddr;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::{ErrorCode, Packet, BLOCK_SIZE};
use crate::receiver::{Disposition, Receiver};
use crate::sender::Sender;
use crate::socket::{SocketError, Transport};
use crate::state::{Direction, TransferState};
use crate::timer::RetransmitTimer;

/// ENOSPC on Linux and macOS.
const ENOSPC: i32 = 28;

/// Counters reported for a completed transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Data blocks written (download) or acknowledged (upload).
    pub blocks: u64,
    /// Payload bytes moved.
    pub bytes: u64,
    /// Data retransmissions (upload) or duplicate blocks re-acknowledged (download).
    pub retransmits: u64,
}

/// One directional transfer over a [`Transport`].
pub struct Transfer<T: Transport> {
    transport: T,
    /// Where the initial request is sent.
    server: SocketAddr,
    /// Transfer identifier of the peer, fixed by its first reply.
    peer: Option<SocketAddr>,
    config: TransferConfig,
    direction: Option<Direction>,
    state: TransferState,
}

impl<T: Transport> Transfer<T> {
    pub fn new(transport: T, server: SocketAddr, config: TransferConfig) -> Self {
        Self {
            transport,
            server,
            peer: None,
            config,
            direction: None,
            state: TransferState::Start,
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Direction of the session, once one has been started.
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Address datagrams are currently sent to.
    pub fn peer(&self) -> SocketAddr {
        self.peer.unwrap_or(self.server)
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give back the transport, e.g. to inspect a test double.
    pub fn into_transport(self) -> T {
        self.transport
    }

    // -----------------------------------------------------------------------
    // Download
    // -----------------------------------------------------------------------

    /// Fetch `remote` from the server into the local file at `local`.
    ///
    /// The file is created (or truncated) before the request goes out and is
    /// flushed and closed on every exit path.  A failed download leaves the
    /// blocks received so far in place.
    pub async fn download(
        &mut self,
        remote: &str,
        local: impl AsRef<Path>,
    ) -> Result<TransferStats, TransferError> {
        let mut file = File::create(local.as_ref()).await?;
        let result = self.download_to(remote, &mut file).await;
        let flushed = file.flush().await;
        let stats = result?;
        flushed?;
        Ok(stats)
    }

    /// Fetch `remote` from the server into `sink`.
    pub async fn download_to<W>(
        &mut self,
        remote: &str,
        sink: &mut W,
    ) -> Result<TransferStats, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        self.begin(Direction::Download);
        let result = self.run_download(remote, sink).await;
        self.finish(result)
    }

    async fn run_download<W>(
        &mut self,
        remote: &str,
        sink: &mut W,
    ) -> Result<TransferStats, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let rrq = Packet::ReadRequest {
            filename: remote.to_string(),
            mode: self.config.mode,
        }
        .encode()?;
        self.send(&rrq).await?;
        log::info!("[tftp] → RRQ {remote:?} mode={} to {}", self.config.mode, self.server);

        let mut receiver = Receiver::new();
        self.state = TransferState::AwaitingBlock(receiver.expected);

        loop {
            let deadline = Instant::now() + self.config.timeout;
            let Some(packet) = self.next_packet(deadline).await? else {
                return Err(TransferError::TransferTimeout {
                    block: receiver.expected,
                    attempts: 1,
                });
            };

            let (block, payload) = match packet {
                Packet::Data { block, payload } => (block, payload),
                other => {
                    log::warn!("[tftp] ignoring unexpected {} while awaiting DATA", other.kind());
                    continue;
                }
            };

            match receiver.on_data(block, payload.len()) {
                Disposition::Accept { last } => {
                    if let Err(e) = sink.write_all(&payload).await {
                        self.report_local_failure(&e).await;
                        return Err(e.into());
                    }
                    log::debug!("[tftp] ← DATA block={block} len={}", payload.len());
                    self.send_ack(block).await?;
                    if last {
                        return Ok(TransferStats {
                            blocks: receiver.blocks,
                            bytes: receiver.bytes,
                            retransmits: receiver.duplicates,
                        });
                    }
                    self.state = TransferState::AwaitingBlock(receiver.expected);
                }
                Disposition::Duplicate => {
                    log::debug!("[tftp] ← duplicate DATA block={block}; re-ACK");
                    self.send_ack(block).await?;
                }
                Disposition::Ahead => {
                    log::warn!(
                        "[tftp] ignoring DATA block={block} ahead of expected {}",
                        receiver.expected
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    /// Send the local file at `local` to the server as `remote`.
    ///
    /// Fails with [`TransferError::SourceFileNotFound`] before any datagram is
    /// sent if the file cannot be opened.
    pub async fn upload(
        &mut self,
        local: impl AsRef<Path>,
        remote: &str,
    ) -> Result<TransferStats, TransferError> {
        let mut file = open_source(local.as_ref()).await?;
        self.upload_from(&mut file, remote).await
    }

    /// Send everything readable from `source` to the server as `remote`.
    pub async fn upload_from<R>(
        &mut self,
        source: &mut R,
        remote: &str,
    ) -> Result<TransferStats, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        self.begin(Direction::Upload);
        let result = self.run_upload(source, remote).await;
        self.finish(result)
    }

    async fn run_upload<R>(
        &mut self,
        source: &mut R,
        remote: &str,
    ) -> Result<TransferStats, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let wrq = Packet::WriteRequest {
            filename: remote.to_string(),
            mode: self.config.mode,
        }
        .encode()?;
        self.send(&wrq).await?;
        log::info!("[tftp] → WRQ {remote:?} mode={} to {}", self.config.mode, self.server);

        let mut sender = Sender::new();
        let mut timer = RetransmitTimer::from_config(&self.config);

        loop {
            let payload = match read_block(source).await {
                Ok(payload) => payload,
                Err(e) => {
                    self.report_local_failure(&e).await;
                    return Err(e.into());
                }
            };
            let len = payload.len();
            // A short read ends the transfer, including a zero-length block
            // after a file that is an exact multiple of the block size.
            let last = len < BLOCK_SIZE;
            let datagram = sender.build_data_packet(payload).encode()?;
            self.send(&datagram).await?;
            sender.record_sent(datagram, len, last);

            let block = sender.next_block;
            log::debug!("[tftp] → DATA block={block} len={len}");
            self.state = TransferState::AwaitingAck(block);
            timer.reset();
            // Runs from the latest transmission of the in-flight block.
            let mut deadline = Instant::now() + timer.timeout;

            loop {
                let unlocked = self.peer.is_none();
                let incoming = self.next_packet(deadline).await?;

                if let Some(Packet::Ack { block: acked }) = incoming {
                    if let Some(entry) = sender.on_ack(acked) {
                        log::debug!("[tftp] ← ACK block={acked}");
                        if entry.last {
                            return Ok(TransferStats {
                                blocks: sender.blocks,
                                bytes: sender.bytes,
                                retransmits: sender.retransmits,
                            });
                        }
                        break;
                    }
                }

                let Some(entry) = sender.in_flight() else {
                    break;
                };

                match incoming {
                    None => {
                        if !timer.on_timeout() {
                            return Err(TransferError::TransferTimeout {
                                block,
                                attempts: timer.timeouts(),
                            });
                        }
                        log::warn!(
                            "[tftp] timeout waiting for ACK {block}; retransmitting ({}/{})",
                            timer.timeouts(),
                            timer.max_retries
                        );
                        self.send(&entry.datagram).await?;
                        sender.on_retransmit();
                        deadline = Instant::now() + timer.timeout;
                    }
                    Some(packet) => {
                        if unlocked && self.peer != Some(self.server) {
                            // First reply came from the peer's transfer ID.
                            log::debug!(
                                "[tftp] peer moved to {}; resending block {block}",
                                self.peer()
                            );
                            self.send(&entry.datagram).await?;
                            sender.on_retransmit();
                            deadline = Instant::now() + timer.timeout;
                        } else {
                            log::debug!(
                                "[tftp] ignoring {} while awaiting ACK {block}",
                                describe(&packet)
                            );
                        }
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn begin(&mut self, direction: Direction) {
        self.direction = Some(direction);
        self.peer = None;
        self.state = TransferState::Start;
    }

    fn finish(
        &mut self,
        result: Result<TransferStats, TransferError>,
    ) -> Result<TransferStats, TransferError> {
        match &result {
            Ok(stats) => {
                self.state = TransferState::Completed;
                if let Some(direction) = self.direction {
                    log::info!(
                        "[tftp] {direction} complete: {} bytes in {} blocks",
                        stats.bytes,
                        stats.blocks
                    );
                }
            }
            Err(e) => {
                log::warn!("[tftp] transfer failed in state {}: {e}", self.state);
                self.state = TransferState::Failed;
            }
        }
        result
    }

    /// Wait until `deadline` for the next datagram from the peer.
    ///
    /// Returns `Ok(None)` once the deadline passes.  Datagrams from foreign
    /// addresses are rejected without extending the deadline.  An Error
    /// message is turned into [`TransferError::PeerProtocolError`].
    async fn next_packet(&mut self, deadline: Instant) -> Result<Option<Packet>, TransferError> {
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                return Ok(None);
            }
            let (bytes, from) = match self.transport.recv_from(wait).await {
                Ok(received) => received,
                Err(SocketError::Timeout(_)) => return Ok(None),
                Err(SocketError::Io(e)) => return Err(e.into()),
            };

            match self.peer {
                Some(peer) if peer != from => {
                    self.reject_foreign(from).await;
                    continue;
                }
                Some(_) => {}
                None => {
                    log::debug!("[tftp] peer transfer ID is {from}");
                    self.peer = Some(from);
                }
            }

            return match Packet::decode(&bytes)? {
                Packet::Error { code, message } => {
                    log::debug!("[tftp] ← ERROR {code}: {message}");
                    Err(TransferError::PeerProtocolError { code, message })
                }
                packet => Ok(Some(packet)),
            };
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        let dest = self.peer();
        self.transport.send_to(bytes, dest).await?;
        Ok(())
    }

    async fn send_ack(&mut self, block: u16) -> Result<(), TransferError> {
        let ack = Packet::Ack { block }.encode()?;
        log::debug!("[tftp] → ACK block={block}");
        self.send(&ack).await
    }

    /// Answer a datagram from an address other than the locked peer.
    async fn reject_foreign(&mut self, from: SocketAddr) {
        log::warn!("[tftp] datagram from unknown transfer ID {from}; rejecting");
        let reply = Packet::Error {
            code: ErrorCode::UnknownTransferId,
            message: "Unknown transfer ID".to_string(),
        };
        if let Ok(bytes) = reply.encode() {
            if let Err(send_err) = self.transport.send_to(&bytes, from).await {
                log::debug!("[tftp] could not reject {from}: {send_err}");
            }
        }
    }

    /// Tell the peer the session is over because of a local I/O failure.
    /// Best effort: the Error message is neither acknowledged nor retried.
    async fn report_local_failure(&mut self, e: &io::Error) {
        let code = if e.raw_os_error() == Some(ENOSPC) {
            ErrorCode::DiskFull
        } else {
            ErrorCode::NotDefined
        };
        let reply = Packet::Error {
            code,
            message: e.to_string().replace('\0', ""),
        };
        if let Ok(bytes) = reply.encode() {
            let dest = self.peer();
            if let Err(send_err) = self.transport.send_to(&bytes, dest).await {
                log::debug!("[tftp] could not report local failure to peer: {send_err}");
            }
        }
    }
}

/// Open the upload source, mapping any failure to `SourceFileNotFound`.
pub async fn open_source(path: &Path) -> Result<File, TransferError> {
    File::open(path)
        .await
        .map_err(|source| TransferError::SourceFileNotFound {
            path: path.to_path_buf(),
            source,
        })
}

/// Read up to [`BLOCK_SIZE`] bytes, stopping short only at end of input.
async fn read_block<R>(source: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

fn describe(packet: &Packet) -> String {
    match packet {
        Packet::Ack { block } => format!("ACK block={block}"),
        Packet::Data { block, .. } => format!("DATA block={block}"),
        other => other.kind().to_string(),
    }
}
