use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use bytes::Bytes;
use log::debug;
use thiserror::Error;

use super::codec::MAX_MESSAGE_LEN;
use crate::config::ResolverConfig;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open UDP socket: {0}")]
    Bind(#[source] io::Error),
    #[error("failed to connect to resolver {addr}: {source}")]
    Connect {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },
    #[error("failed to send query: {0}")]
    Send(#[source] io::Error),
    #[error("failed to receive response: {0}")]
    Receive(#[source] io::Error),
    #[error("resolver {0} did not answer in time")]
    Timeout(SocketAddrV4),
    #[error("resolver sent an empty datagram")]
    EmptyResponse,
}

/// One query, one datagram back.
///
/// The socket is local to this call and closed when it returns, whichever way
/// it returns. Replies longer than 512 bytes are cut by the receive buffer.
pub fn exchange(config: &ResolverConfig, query: &[u8]) -> Result<Bytes, TransportError> {
    let server = SocketAddrV4::new(config.addr, config.port);

    let socket =
        UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).map_err(TransportError::Bind)?;
    socket
        .connect(server)
        .map_err(|source| TransportError::Connect {
            addr: server,
            source,
        })?;
    socket
        .set_read_timeout(config.timeout)
        .map_err(TransportError::Bind)?;

    let sent = socket.send(query).map_err(TransportError::Send)?;
    debug!("sent {sent} byte query to {server}");

    let mut buf = [0u8; MAX_MESSAGE_LEN];
    let received = match socket.recv(&mut buf) {
        Ok(0) => return Err(TransportError::EmptyResponse),
        Ok(n) => n,
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            return Err(TransportError::Timeout(server));
        }
        Err(e) => return Err(TransportError::Receive(e)),
    };
    debug!("received {received} byte response from {server}");

    Ok(Bytes::copy_from_slice(&buf[..received]))
}
