//! Tokio UDP socket transport.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::debug;

use crate::traits::{Datagram, DatagramTransport, TransportError};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM: usize = 65_507;

pub struct UdpTransport {
    socket: UdpSocket,
    closed: watch::Sender<bool>,
}

impl UdpTransport {
    /// Bind to `addr` with broadcast enabled.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;
        let (closed, _) = watch::channel(false);
        debug!(local = %socket.local_addr()?, "udp transport bound");
        Ok(Self { socket, closed })
    }

    /// Bind an ephemeral port on all interfaces.
    pub async fn bind_any() -> Result<Self, TransportError> {
        Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send_to(&self, peer: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        match self.socket.send_to(data, peer).await {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::AddrNotAvailable) => {
                Err(TransportError::Unreachable(peer))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recv_from(&self) -> Result<Datagram, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }
        let mut buf = vec![0u8; MAX_DATAGRAM];
        tokio::select! {
            received = self.socket.recv_from(&mut buf) => {
                let (len, peer) = received?;
                buf.truncate(len);
                Ok(Datagram { peer, data: buf })
            }
            _ = closed.changed() => Err(TransportError::Closed),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
