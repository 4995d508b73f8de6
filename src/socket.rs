//! Datagram transport abstraction.
//!
//! [`Transport`] is the seam between the transfer engine and the network: it
//! moves opaque byte buffers to and from a peer address, with a bounded wait on
//! receive.  [`Socket`] is the production implementation, a thin wrapper
//! around `tokio::net::UdpSocket`.  All protocol logic lives elsewhere; this
//! module owns only byte I/O.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;

/// Receive buffer size.  Large enough that an oversized datagram is seen whole
/// and rejected by the codec instead of being silently truncated.
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from a receive.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    /// Nothing arrived within the wait window.
    #[error("no datagram within {0:?}")]
    Timeout(Duration),
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Send/receive of opaque datagrams.
///
/// Methods take `&mut self` so scripted test transports can record traffic
/// without interior mutability.
pub trait Transport {
    /// Send `bytes` as a single datagram to `dest`.
    fn send_to(
        &mut self,
        bytes: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait at most `wait` for the next datagram.
    ///
    /// Returns `(bytes, sender_address)`, or [`SocketError::Timeout`] when the
    /// window expires.
    fn recv_from(
        &mut self,
        wait: Duration,
    ) -> impl Future<Output = Result<(Vec<u8>, SocketAddr), SocketError>> + Send;
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// A UDP socket bound to one local port for the lifetime of a session.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
    buf: Vec<u8>,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            inner,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }
}

impl Transport for Socket {
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    async fn recv_from(&mut self, wait: Duration) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        match tokio::time::timeout(wait, self.inner.recv_from(&mut self.buf)).await {
            Ok(Ok((n, addr))) => Ok((self.buf[..n].to_vec(), addr)),
            Ok(Err(e)) => Err(SocketError::Io(e)),
            Err(_) => Err(SocketError::Timeout(wait)),
        }
    }
}
