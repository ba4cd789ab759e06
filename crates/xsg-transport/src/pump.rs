//! Receive loop that turns a transport into a channel of datagrams.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::traits::{Datagram, DatagramTransport, TransportError};

/// Inbound queue depth before the receive loop applies backpressure.
pub const INBOUND_QUEUE: usize = 256;

/// Spawn a task that reads datagrams and forwards them to the returned
/// receiver.
///
/// Recoverable socket errors are logged and skipped. A fatal error is
/// forwarded once and ends the loop; so does closing the transport or
/// dropping the receiver.
pub fn spawn_receiver(
    transport: Arc<dyn DatagramTransport>,
) -> (mpsc::Receiver<Result<Datagram, TransportError>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let handle = tokio::spawn(async move {
        loop {
            match transport.recv_from().await {
                Ok(datagram) => {
                    if tx.send(Ok(datagram)).await.is_err() {
                        break;
                    }
                }
                Err(TransportError::Closed) => {
                    debug!("transport closed, receive loop exiting");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "transport failed");
                    let _ = tx.send(Err(e)).await;
                    break;
                }
                Err(e) => debug!(error = %e, "ignoring recoverable receive error"),
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryNetwork;
    use std::net::SocketAddr;

    #[tokio::test]
    async fn forwards_until_closed() {
        let net = MemoryNetwork::new();
        let a: SocketAddr = "10.0.0.2:40000".parse().unwrap();
        let b: SocketAddr = "10.0.0.3:5050".parse().unwrap();
        let ta = Arc::new(net.bind(a));
        let tb = net.bind(b);

        let (mut rx, handle) = spawn_receiver(ta.clone());
        tb.send_to(a, b"one").await.unwrap();
        tb.send_to(a, b"two").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().unwrap().data, b"one");
        assert_eq!(rx.recv().await.unwrap().unwrap().data, b"two");

        ta.close().await;
        tokio_test::assert_ok!(handle.await);
        assert!(rx.recv().await.is_none());
    }
}
