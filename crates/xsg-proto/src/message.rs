//! Message packet header and framing.
//!
//! Layout: 26-byte header, encrypted payload padded to the block size,
//! 32-byte integrity tag.

use bytes::BufMut;

use crate::error::DecodeError;
use crate::packet::PacketType;
use crate::padded_len;
use crate::primitives::Reader;
use crate::TAG_LEN;

/// Header length of a message packet.
pub const HEADER_LEN: usize = 26;

/// Header bytes that seed the per-packet IV.
pub const IV_SEED_LEN: usize = 16;

/// Current message version carried in the flags word.
pub const MESSAGE_VERSION: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Ack,
    LocalJoin,
    Json,
    GameDvrRecord,
    ConsoleStatus,
    StartChannelRequest,
    StartChannelResponse,
    StopChannel,
    Disconnect,
    PowerOff,
    MediaControllerRemoved,
    MediaCommand,
    MediaCommandResult,
    MediaState,
    Gamepad,
    Unknown(u16),
}

impl MessageType {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0001 => MessageType::Ack,
            0x0003 => MessageType::LocalJoin,
            0x001c => MessageType::Json,
            0x001d => MessageType::GameDvrRecord,
            0x001e => MessageType::ConsoleStatus,
            0x0026 => MessageType::StartChannelRequest,
            0x0027 => MessageType::StartChannelResponse,
            0x0028 => MessageType::StopChannel,
            0x002a => MessageType::Disconnect,
            0x0039 => MessageType::PowerOff,
            0x0f00 => MessageType::MediaControllerRemoved,
            0x0f01 => MessageType::MediaCommand,
            0x0f02 => MessageType::MediaCommandResult,
            0x0f03 => MessageType::MediaState,
            0x0f0a => MessageType::Gamepad,
            other => MessageType::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            MessageType::Ack => 0x0001,
            MessageType::LocalJoin => 0x0003,
            MessageType::Json => 0x001c,
            MessageType::GameDvrRecord => 0x001d,
            MessageType::ConsoleStatus => 0x001e,
            MessageType::StartChannelRequest => 0x0026,
            MessageType::StartChannelResponse => 0x0027,
            MessageType::StopChannel => 0x0028,
            MessageType::Disconnect => 0x002a,
            MessageType::PowerOff => 0x0039,
            MessageType::MediaControllerRemoved => 0x0f00,
            MessageType::MediaCommand => 0x0f01,
            MessageType::MediaCommandResult => 0x0f02,
            MessageType::MediaState => 0x0f03,
            MessageType::Gamepad => 0x0f0a,
            MessageType::Unknown(code) => code & 0x0fff,
        }
    }
}

/// Flags word: version (2 bits), need_ack, is_fragment, message type (12 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFlags {
    pub version: u8,
    pub need_ack: bool,
    pub is_fragment: bool,
    pub message_type: MessageType,
}

impl MessageFlags {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            version: MESSAGE_VERSION,
            need_ack: false,
            is_fragment: false,
            message_type,
        }
    }

    pub fn with_ack(mut self) -> Self {
        self.need_ack = true;
        self
    }

    pub fn to_u16(self) -> u16 {
        (u16::from(self.version & 0x3) << 14)
            | (u16::from(self.need_ack) << 13)
            | (u16::from(self.is_fragment) << 12)
            | self.message_type.code()
    }

    pub fn from_u16(raw: u16) -> Self {
        Self {
            version: (raw >> 14) as u8,
            need_ack: raw & 0x2000 != 0,
            is_fragment: raw & 0x1000 != 0,
            message_type: MessageType::from_code(raw & 0x0fff),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Unpadded plaintext length of the payload.
    pub protected_len: u16,
    pub sequence: u32,
    pub target_participant: u32,
    pub source_participant: u32,
    pub flags: MessageFlags,
    pub channel_id: u64,
}

impl MessageHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.put_u16(PacketType::Message.code());
        out.put_u16(self.protected_len);
        out.put_u32(self.sequence);
        out.put_u32(self.target_participant);
        out.put_u32(self.source_participant);
        out.put_u16(self.flags.to_u16());
        out.put_u64(self.channel_id);
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&out);
        header
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let code = r.u16()?;
        if code != PacketType::Message.code() {
            return Err(DecodeError::UnknownPacketType(code));
        }
        Ok(Self {
            protected_len: r.u16()?,
            sequence: r.u32()?,
            target_participant: r.u32()?,
            source_participant: r.u32()?,
            flags: MessageFlags::from_u16(r.u16()?),
            channel_id: r.u64()?,
        })
    }
}

/// A message packet as it travels: the payload is ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePacket {
    pub header: MessageHeader,
    pub protected: Vec<u8>,
    pub tag: Vec<u8>,
}

impl MessagePacket {
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        if self.protected.len() != padded_len(self.header.protected_len as usize) {
            return Err(DecodeError::malformed("protected_payload", "length is not the padded size"));
        }
        if self.tag.len() != TAG_LEN {
            return Err(DecodeError::MissingField("tag"));
        }
        let mut out = Vec::with_capacity(HEADER_LEN + self.protected.len() + TAG_LEN);
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.protected);
        out.extend_from_slice(&self.tag);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN + TAG_LEN {
            return Err(DecodeError::Truncated {
                needed: HEADER_LEN + TAG_LEN,
                remaining: buf.len(),
            });
        }
        let header = MessageHeader::decode(&buf[..HEADER_LEN])?;
        let body = &buf[HEADER_LEN..buf.len() - TAG_LEN];
        if body.len() != padded_len(header.protected_len as usize) {
            return Err(DecodeError::Truncated {
                needed: padded_len(header.protected_len as usize),
                remaining: body.len(),
            });
        }
        Ok(Self {
            header,
            protected: body.to_vec(),
            tag: buf[buf.len() - TAG_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_bit_layout() {
        let flags = MessageFlags::new(MessageType::LocalJoin).with_ack();
        assert_eq!(flags.to_u16(), 0xa003);
        assert_eq!(MessageFlags::from_u16(0xa003), flags);

        let fragment = MessageFlags {
            is_fragment: true,
            ..MessageFlags::new(MessageType::Json)
        };
        assert_eq!(fragment.to_u16(), 0x901c);
    }

    #[test]
    fn unknown_message_types_are_preserved() {
        let ty = MessageType::from_code(0x0f2b);
        assert_eq!(ty, MessageType::Unknown(0x0f2b));
        assert_eq!(ty.code(), 0x0f2b);

        assert_eq!(MessageType::from_code(0x001d), MessageType::GameDvrRecord);
        assert_eq!(MessageType::GameDvrRecord.code(), 0x001d);
    }

    #[test]
    fn header_is_26_bytes() {
        let header = MessageHeader {
            protected_len: 5,
            sequence: 1,
            target_participant: 0,
            source_participant: 31,
            flags: MessageFlags::new(MessageType::Ack),
            channel_id: crate::ACK_CHANNEL_ID,
        };
        let raw = header.encode();
        assert_eq!(&raw[..2], &[0xd0, 0x0d]);
        assert_eq!(MessageHeader::decode(&raw).unwrap(), header);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(matches!(
            MessagePacket::decode(&[0xd0, 0x0d, 0x00]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_rejects_body_length_mismatch() {
        let header = MessageHeader {
            protected_len: 20,
            sequence: 1,
            target_participant: 0,
            source_participant: 0,
            flags: MessageFlags::new(MessageType::Json),
            channel_id: 0,
        };
        let mut raw = header.encode().to_vec();
        raw.extend_from_slice(&[0u8; 16]);
        raw.extend_from_slice(&[0u8; TAG_LEN]);
        assert!(matches!(
            MessagePacket::decode(&raw),
            Err(DecodeError::Truncated { needed: 32, remaining: 16 })
        ));
    }
}
