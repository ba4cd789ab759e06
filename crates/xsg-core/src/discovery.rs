//! Discovery scan and power-on.
//!
//! Both run straight against a transport without a session: discovery because
//! it precedes any session, power-on because a sleeping console cannot take
//! part in a handshake.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, info};
use xsg_crypto::ConsoleCertificate;
use xsg_proto::{decode, DiscoveryRequest, Packet, PowerOnRequest, SimplePacket};
use xsg_transport::{DatagramTransport, TransportError};

/// Discovery requests sent over one scan window.
const DISCOVERY_BURSTS: u32 = 3;

/// A console that answered a discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConsole {
    pub name: String,
    pub uuid: String,
    pub live_id: String,
    pub address: SocketAddr,
}

/// Send discovery requests to `target` (unicast or broadcast) for `timeout`
/// and collect every distinct console that answers.
pub async fn discover(
    transport: &dyn DatagramTransport,
    target: SocketAddr,
    timeout: Duration,
) -> Result<Vec<DiscoveredConsole>, TransportError> {
    let request = SimplePacket::DiscoveryRequest(DiscoveryRequest::default())
        .encode()
        .map_err(|e| TransportError::Other(e.to_string()))?;
    let deadline = Instant::now() + timeout;
    let interval = (timeout / DISCOVERY_BURSTS).max(Duration::from_millis(10));

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut next_send = Instant::now();

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if now >= next_send {
            debug!(%target, "sending discovery request");
            transport.send_to(target, &request).await?;
            next_send = now + interval;
        }

        let wake = next_send.min(deadline);
        let datagram = match time::timeout_at(wake, transport.recv_from()).await {
            Err(_) => continue,
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) => {
                debug!(error = %e, "ignoring receive error during discovery");
                continue;
            }
            Ok(Ok(datagram)) => datagram,
        };

        let response = match decode(&datagram.data) {
            Ok(Packet::Simple(SimplePacket::DiscoveryResponse(response))) => response,
            Ok(other) => {
                debug!(peer = %datagram.peer, packet_type = ?other.packet_type(), "not a discovery response");
                continue;
            }
            Err(e) => {
                debug!(peer = %datagram.peer, error = %e, "undecodable datagram during discovery");
                continue;
            }
        };
        let live_id = match ConsoleCertificate::parse(&response.certificate) {
            Ok(cert) => cert.live_id,
            Err(e) => {
                debug!(peer = %datagram.peer, error = %e, "discovery response with bad certificate");
                continue;
            }
        };
        if seen.insert(live_id.clone()) {
            info!(name = %response.name, %live_id, address = %datagram.peer, "found console");
            found.push(DiscoveredConsole {
                name: response.name,
                uuid: response.uuid,
                live_id,
                address: datagram.peer,
            });
        }
    }
    Ok(found)
}

/// Send the power-on packet `attempts` times, `interval` apart, to `address`
/// and to the broadcast address on the same port.
///
/// Best effort: a console that boots does not acknowledge. Poll discovery
/// afterwards to confirm.
pub async fn power_on(
    transport: &dyn DatagramTransport,
    address: SocketAddr,
    live_id: &str,
    attempts: u32,
    interval: Duration,
) -> Result<(), TransportError> {
    let packet = SimplePacket::PowerOnRequest(PowerOnRequest {
        live_id: live_id.to_string(),
    })
    .encode()
    .map_err(|e| TransportError::Other(e.to_string()))?;
    let broadcast = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), address.port());

    info!(%address, live_id, attempts, "sending power-on");
    for attempt in 0..attempts {
        if attempt > 0 {
            time::sleep(interval).await;
        }
        transport.send_to(address, &packet).await?;
        if let Err(e) = transport.send_to(broadcast, &packet).await {
            debug!(error = %e, "broadcast power-on failed");
        }
    }
    Ok(())
}
