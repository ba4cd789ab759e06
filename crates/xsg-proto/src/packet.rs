//! Packet type table and top-level encode/decode.

use crate::error::DecodeError;
use crate::message::MessagePacket;
use crate::simple::SimplePacket;

/// Two-byte type code at the start of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    DiscoveryRequest,
    DiscoveryResponse,
    PowerOnRequest,
    ConnectRequest,
    ConnectResponse,
    Message,
}

impl PacketType {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0xdd00 => Some(PacketType::DiscoveryRequest),
            0xdd01 => Some(PacketType::DiscoveryResponse),
            0xdd02 => Some(PacketType::PowerOnRequest),
            0xcc00 => Some(PacketType::ConnectRequest),
            0xcc01 => Some(PacketType::ConnectResponse),
            0xd00d => Some(PacketType::Message),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            PacketType::DiscoveryRequest => 0xdd00,
            PacketType::DiscoveryResponse => 0xdd01,
            PacketType::PowerOnRequest => 0xdd02,
            PacketType::ConnectRequest => 0xcc00,
            PacketType::ConnectResponse => 0xcc01,
            PacketType::Message => 0xd00d,
        }
    }

    pub fn is_simple(self) -> bool {
        !matches!(self, PacketType::Message)
    }

    /// Read the type code of a datagram without decoding the rest.
    pub fn peek(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < 2 {
            return Err(DecodeError::Truncated {
                needed: 2,
                remaining: buf.len(),
            });
        }
        let code = u16::from_be_bytes([buf[0], buf[1]]);
        PacketType::from_code(code).ok_or(DecodeError::UnknownPacketType(code))
    }
}

/// A decoded datagram of either family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Simple(SimplePacket),
    Message(MessagePacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Simple(p) => p.packet_type(),
            Packet::Message(_) => PacketType::Message,
        }
    }
}

/// Serialize a packet; fails with `MissingField` when the target layout is incomplete.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, DecodeError> {
    match packet {
        Packet::Simple(p) => p.encode(),
        Packet::Message(p) => p.encode(),
    }
}

/// Parse a datagram into a typed packet.
pub fn decode(buf: &[u8]) -> Result<Packet, DecodeError> {
    let packet_type = PacketType::peek(buf)?;
    if packet_type.is_simple() {
        SimplePacket::decode(packet_type, buf).map(Packet::Simple)
    } else {
        MessagePacket::decode(buf).map(Packet::Message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{DiscoveryRequest, PowerOnRequest};

    #[test]
    fn unknown_type_code() {
        assert_eq!(decode(&[0xab, 0xcd, 0, 0]), Err(DecodeError::UnknownPacketType(0xabcd)));
    }

    #[test]
    fn empty_buffer_is_truncated() {
        assert!(matches!(decode(&[]), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[0xdd]), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn truncated_simple_packet() {
        let bytes = encode(&Packet::Simple(SimplePacket::DiscoveryRequest(
            DiscoveryRequest::default(),
        )))
        .unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 3]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn power_on_round_trip() {
        let packet = Packet::Simple(SimplePacket::PowerOnRequest(PowerOnRequest {
            live_id: "FD00112233FFEE66".into(),
        }));
        let bytes = encode(&packet).unwrap();
        assert_eq!(&bytes[..2], &[0xdd, 0x02]);
        assert_eq!(decode(&bytes).unwrap(), packet);
    }
}
