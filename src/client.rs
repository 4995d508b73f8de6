//! Session driver: turn a host name and an action into one transfer.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;

use tokio::net::lookup_host;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::socket::Socket;
use crate::transfer::{open_source, Transfer, TransferStats};

/// Resolve `host:port` to the first matching socket address.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransferError> {
    lookup_host((host, port))
        .await
        .map_err(|e| TransferError::Resolve(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| TransferError::Resolve(format!("{host}:{port}: no addresses")))
}

/// Bind an ephemeral socket of the right address family and wrap it in a
/// fresh [`Transfer`] aimed at `server`.
pub async fn connect(
    server: SocketAddr,
    config: TransferConfig,
) -> Result<Transfer<Socket>, TransferError> {
    let local: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = Socket::bind(local).await?;
    log::debug!("[tftp] bound {} for session with {server}", socket.local_addr);
    Ok(Transfer::new(socket, server, config))
}

/// Download `remote` from `host` into `local`.
pub async fn get(
    host: &str,
    remote: &str,
    local: impl AsRef<Path>,
    config: TransferConfig,
) -> Result<TransferStats, TransferError> {
    let server = resolve(host, config.port).await?;
    let mut transfer = connect(server, config).await?;
    transfer.download(remote, local).await
}

/// Upload `local` to `host` as `remote`.
///
/// The source file is opened before the host is resolved, so a missing file
/// fails without touching the network.
pub async fn put(
    host: &str,
    local: impl AsRef<Path>,
    remote: &str,
    config: TransferConfig,
) -> Result<TransferStats, TransferError> {
    let mut file = open_source(local.as_ref()).await?;
    let server = resolve(host, config.port).await?;
    let mut transfer = connect(server, config).await?;
    transfer.upload_from(&mut file, remote).await
}
