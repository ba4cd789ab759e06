//! Transport trait shared by the UDP socket and the in-memory test network.

use std::net::SocketAddr;

use async_trait::async_trait;

/// A received datagram and the address it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
    pub peer: SocketAddr,
    pub data: Vec<u8>,
}

/// Unreliable datagram transport.
///
/// One session owns one transport for its lifetime; implementations must
/// allow `send_to` and `recv_from` to run concurrently from different tasks.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Send one datagram. Returns once it has been handed to the network.
    async fn send_to(&self, peer: SocketAddr, data: &[u8]) -> Result<(), TransportError>;

    /// Wait for the next datagram. Fails with [`TransportError::Closed`]
    /// once [`close`](Self::close) has been called.
    async fn recv_from(&self) -> Result<Datagram, TransportError>;

    fn local_addr(&self) -> Result<SocketAddr, TransportError>;

    /// Release the binding and wake any pending receiver.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Address unreachable: {0}")]
    Unreachable(SocketAddr),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the transport can no longer be used.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Closed | TransportError::Unreachable(_) => true,
            TransportError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            TransportError::Other(_) => false,
        }
    }
}
