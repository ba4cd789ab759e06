//! In-memory datagram network for tests.
//!
//! Every endpoint bound on a [`MemoryNetwork`] can reach every other by
//! address. Sends to `255.255.255.255:port` reach all endpoints on that port.
//! Endpoints can be isolated to simulate a console going silent.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;

use crate::traits::{Datagram, DatagramTransport, TransportError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentDatagram {
    pub from: SocketAddr,
    pub to: SocketAddr,
    pub data: Vec<u8>,
}

struct Route {
    id: u64,
    tx: mpsc::UnboundedSender<Datagram>,
}

#[derive(Default)]
struct Hub {
    routes: DashMap<SocketAddr, Route>,
    next_id: AtomicU64,
    isolated: Mutex<HashSet<SocketAddr>>,
    log: Mutex<Vec<SentDatagram>>,
    drop_rate: Mutex<f64>,
}

/// Shared in-memory network; cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Hub>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint at `addr`, replacing any previous binding there.
    pub fn bind(&self, addr: SocketAddr) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        self.hub.routes.insert(addr, Route { id, tx });
        MemoryTransport {
            id,
            addr,
            hub: self.hub.clone(),
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
        }
    }

    /// Drop every datagram sent to or from `addr` while isolated.
    pub fn set_isolated(&self, addr: SocketAddr, isolated: bool) {
        let mut set = self.hub.isolated.lock();
        if isolated {
            set.insert(addr);
        } else {
            set.remove(&addr);
        }
    }

    /// Configure simulated packet loss (0.0 - 1.0)
    pub fn set_drop_rate(&self, rate: f64) {
        *self.hub.drop_rate.lock() = rate.clamp(0.0, 1.0);
    }

    /// Every datagram handed to the network, delivered or not.
    pub fn sent(&self) -> Vec<SentDatagram> {
        self.hub.log.lock().clone()
    }

    /// Datagrams sent from `addr`.
    pub fn sent_from(&self, addr: SocketAddr) -> Vec<SentDatagram> {
        self.hub.log.lock().iter().filter(|d| d.from == addr).cloned().collect()
    }
}

impl Hub {
    fn deliver(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        self.log.lock().push(SentDatagram {
            from,
            to,
            data: data.to_vec(),
        });

        {
            let isolated = self.isolated.lock();
            if isolated.contains(&from) || isolated.contains(&to) {
                return;
            }
        }
        let rate = *self.drop_rate.lock();
        if rate > 0.0 && rand::thread_rng().gen::<f64>() < rate {
            return;
        }

        let datagram = Datagram {
            peer: from,
            data: data.to_vec(),
        };
        if to.ip() == IpAddr::V4(Ipv4Addr::BROADCAST) {
            for route in self.routes.iter() {
                if route.key().port() == to.port() && *route.key() != from {
                    let _ = route.value().tx.send(datagram.clone());
                }
            }
        } else if let Some(route) = self.routes.get(&to) {
            let _ = route.tx.send(datagram);
        }
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    id: u64,
    addr: SocketAddr,
    hub: Arc<Hub>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    closed: AtomicBool,
}

#[async_trait]
impl DatagramTransport for MemoryTransport {
    async fn send_to(&self, peer: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.hub.deliver(self.addr, peer, data);
        Ok(())
    }

    async fn recv_from(&self) -> Result<Datagram, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.rx.lock().await.recv().await.ok_or(TransportError::Closed)
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.addr)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Dropping the route's sender ends any pending recv.
            self.unroute();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MemoryTransport {
    fn unroute(&self) {
        self.hub.routes.remove_if(&self.addr, |_, route| route.id == self.id);
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.unroute();
    }
}
