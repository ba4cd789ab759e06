//! Simple (fixed-layout) packets: discovery, power-on and the connect handshake.
//!
//! Header: type u16, unprotected length u16, protected length u16 (connect
//! packets only), version u16.

use bytes::BufMut;

use crate::error::DecodeError;
use crate::packet::PacketType;
use crate::padded_len;
use crate::primitives::{put_prefixed_bytes, put_sgstring, Reader};
use crate::TAG_LEN;

/// Client type announced in discovery; the console only answers known types.
pub const CLIENT_TYPE_ANDROID: u16 = 0x08;

/// Highest protocol version this client speaks.
pub const PROTOCOL_VERSION: u16 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub flags: u32,
    pub client_type: u16,
    pub min_version: u16,
    pub max_version: u16,
}

impl Default for DiscoveryRequest {
    fn default() -> Self {
        Self {
            flags: 0,
            client_type: CLIENT_TYPE_ANDROID,
            min_version: 0,
            max_version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResponse {
    pub flags: u32,
    pub client_type: u16,
    pub name: String,
    pub uuid: String,
    pub last_error: u32,
    /// DER-encoded X.509 certificate; subject CN is the console's live id.
    pub certificate: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerOnRequest {
    pub live_id: String,
}

/// Public key encodings the connect request can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyType {
    EcdhP256 = 0,
    EcdhP384 = 1,
    EcdhP521 = 2,
}

impl PublicKeyType {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(PublicKeyType::EcdhP256),
            1 => Some(PublicKeyType::EcdhP384),
            2 => Some(PublicKeyType::EcdhP521),
            _ => None,
        }
    }

    /// Raw X||Y length on the wire.
    pub fn key_len(self) -> usize {
        match self {
            PublicKeyType::EcdhP256 => 64,
            PublicKeyType::EcdhP384 => 96,
            PublicKeyType::EcdhP521 => 132,
        }
    }
}

/// Connect request as it travels: the protected part is ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub client_uuid: [u8; 16],
    pub public_key_type: PublicKeyType,
    pub public_key: Vec<u8>,
    pub iv: [u8; 16],
    /// Unpadded plaintext length of the protected payload.
    pub protected_len: u16,
    pub protected: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Plaintext of the connect request's protected payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectRequestProtected {
    pub user_hash: String,
    pub auth_token: String,
    pub request_num: u32,
    pub group_start: u32,
    pub group_end: u32,
}

/// Connect response as it travels: the protected part is ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub iv: [u8; 16],
    pub protected_len: u16,
    pub protected: Vec<u8>,
    pub tag: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Success,
    Pending,
    FailUnknown,
    FailAnonymousConnectionsDisabled,
    FailDeviceLimitExceeded,
    FailSmartglassDisabled,
    FailUserAuthFailed,
    FailUserSigninFailed,
    FailUserSigninTimeout,
    FailUserSigninRequired,
    Other(u16),
}

impl ConnectResult {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ConnectResult::Success,
            1 => ConnectResult::Pending,
            2 => ConnectResult::FailUnknown,
            3 => ConnectResult::FailAnonymousConnectionsDisabled,
            4 => ConnectResult::FailDeviceLimitExceeded,
            5 => ConnectResult::FailSmartglassDisabled,
            6 => ConnectResult::FailUserAuthFailed,
            7 => ConnectResult::FailUserSigninFailed,
            8 => ConnectResult::FailUserSigninTimeout,
            9 => ConnectResult::FailUserSigninRequired,
            other => ConnectResult::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            ConnectResult::Success => 0,
            ConnectResult::Pending => 1,
            ConnectResult::FailUnknown => 2,
            ConnectResult::FailAnonymousConnectionsDisabled => 3,
            ConnectResult::FailDeviceLimitExceeded => 4,
            ConnectResult::FailSmartglassDisabled => 5,
            ConnectResult::FailUserAuthFailed => 6,
            ConnectResult::FailUserSigninFailed => 7,
            ConnectResult::FailUserSigninTimeout => 8,
            ConnectResult::FailUserSigninRequired => 9,
            ConnectResult::Other(code) => code,
        }
    }

    /// Failures caused by the user credentials rather than the handshake.
    pub fn is_auth_failure(self) -> bool {
        matches!(
            self,
            ConnectResult::FailUserAuthFailed
                | ConnectResult::FailUserSigninFailed
                | ConnectResult::FailUserSigninTimeout
                | ConnectResult::FailUserSigninRequired
        )
    }
}

/// Plaintext of the connect response's protected payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponseProtected {
    pub result: ConnectResult,
    pub pairing_state: u16,
    pub participant_id: u32,
}

/// Any simple packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimplePacket {
    DiscoveryRequest(DiscoveryRequest),
    DiscoveryResponse(DiscoveryResponse),
    PowerOnRequest(PowerOnRequest),
    ConnectRequest(ConnectRequest),
    ConnectResponse(ConnectResponse),
}

impl SimplePacket {
    pub fn packet_type(&self) -> PacketType {
        match self {
            SimplePacket::DiscoveryRequest(_) => PacketType::DiscoveryRequest,
            SimplePacket::DiscoveryResponse(_) => PacketType::DiscoveryResponse,
            SimplePacket::PowerOnRequest(_) => PacketType::PowerOnRequest,
            SimplePacket::ConnectRequest(_) => PacketType::ConnectRequest,
            SimplePacket::ConnectResponse(_) => PacketType::ConnectResponse,
        }
    }

    fn version(&self) -> u16 {
        match self {
            SimplePacket::DiscoveryRequest(_) | SimplePacket::PowerOnRequest(_) => 0,
            _ => PROTOCOL_VERSION,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut unprotected = Vec::new();
        let mut protected: Option<(u16, &[u8], &[u8])> = None;

        match self {
            SimplePacket::DiscoveryRequest(p) => {
                unprotected.put_u32(p.flags);
                unprotected.put_u16(p.client_type);
                unprotected.put_u16(p.min_version);
                unprotected.put_u16(p.max_version);
            }
            SimplePacket::DiscoveryResponse(p) => {
                if p.certificate.is_empty() {
                    return Err(DecodeError::MissingField("certificate"));
                }
                unprotected.put_u32(p.flags);
                unprotected.put_u16(p.client_type);
                put_sgstring(&mut unprotected, &p.name)?;
                put_sgstring(&mut unprotected, &p.uuid)?;
                unprotected.put_u32(p.last_error);
                put_prefixed_bytes(&mut unprotected, &p.certificate)?;
            }
            SimplePacket::PowerOnRequest(p) => {
                if p.live_id.is_empty() {
                    return Err(DecodeError::MissingField("live_id"));
                }
                put_sgstring(&mut unprotected, &p.live_id)?;
            }
            SimplePacket::ConnectRequest(p) => {
                if p.public_key.is_empty() {
                    return Err(DecodeError::MissingField("public_key"));
                }
                if p.public_key.len() != p.public_key_type.key_len() {
                    return Err(DecodeError::malformed("public_key", "length does not match key type"));
                }
                unprotected.extend_from_slice(&p.client_uuid);
                unprotected.put_u16(p.public_key_type as u16);
                unprotected.extend_from_slice(&p.public_key);
                unprotected.extend_from_slice(&p.iv);
                protected = Some((p.protected_len, &p.protected, &p.tag));
            }
            SimplePacket::ConnectResponse(p) => {
                unprotected.extend_from_slice(&p.iv);
                protected = Some((p.protected_len, &p.protected, &p.tag));
            }
        }

        if let Some((len, ciphertext, tag)) = protected {
            if ciphertext.is_empty() {
                return Err(DecodeError::MissingField("protected_payload"));
            }
            if ciphertext.len() != padded_len(len as usize) {
                return Err(DecodeError::malformed("protected_payload", "length is not the padded size"));
            }
            if tag.len() != TAG_LEN {
                return Err(DecodeError::MissingField("tag"));
            }
        }

        let mut out = Vec::with_capacity(8 + unprotected.len());
        out.put_u16(self.packet_type().code());
        out.put_u16(unprotected.len() as u16);
        if let Some((len, _, _)) = protected {
            out.put_u16(len);
        }
        out.put_u16(self.version());
        out.extend_from_slice(&unprotected);
        if let Some((_, ciphertext, tag)) = protected {
            out.extend_from_slice(ciphertext);
            out.extend_from_slice(tag);
        }
        Ok(out)
    }

    /// Decode a simple packet whose type code has already been identified.
    pub(crate) fn decode(packet_type: PacketType, buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let _code = r.u16()?;
        let unprotected_len = r.u16()? as usize;
        let protected_len = match packet_type {
            PacketType::ConnectRequest | PacketType::ConnectResponse => Some(r.u16()?),
            _ => None,
        };
        let _version = r.u16()?;

        let mut body = Reader::new(r.bytes(unprotected_len)?);

        let packet = match packet_type {
            PacketType::DiscoveryRequest => SimplePacket::DiscoveryRequest(DiscoveryRequest {
                flags: body.u32()?,
                client_type: body.u16()?,
                min_version: body.u16()?,
                max_version: body.u16()?,
            }),
            PacketType::DiscoveryResponse => SimplePacket::DiscoveryResponse(DiscoveryResponse {
                flags: body.u32()?,
                client_type: body.u16()?,
                name: body.sgstring("name")?,
                uuid: body.sgstring("uuid")?,
                last_error: body.u32()?,
                certificate: body.prefixed_bytes()?,
            }),
            PacketType::PowerOnRequest => SimplePacket::PowerOnRequest(PowerOnRequest {
                live_id: body.sgstring("live_id")?,
            }),
            PacketType::ConnectRequest => {
                let client_uuid = body.array16()?;
                let key_code = body.u16()?;
                let public_key_type = PublicKeyType::from_code(key_code)
                    .ok_or(DecodeError::malformed("public_key_type", "unsupported curve"))?;
                let public_key = body.bytes(public_key_type.key_len())?.to_vec();
                let iv = body.array16()?;
                let protected_len = protected_len.unwrap_or_default();
                let (protected, tag) = read_protected(&mut r, protected_len)?;
                SimplePacket::ConnectRequest(ConnectRequest {
                    client_uuid,
                    public_key_type,
                    public_key,
                    iv,
                    protected_len,
                    protected,
                    tag,
                })
            }
            PacketType::ConnectResponse => {
                let iv = body.array16()?;
                let protected_len = protected_len.unwrap_or_default();
                let (protected, tag) = read_protected(&mut r, protected_len)?;
                SimplePacket::ConnectResponse(ConnectResponse {
                    iv,
                    protected_len,
                    protected,
                    tag,
                })
            }
            PacketType::Message => {
                return Err(DecodeError::malformed("packet_type", "not a simple packet"))
            }
        };
        Ok(packet)
    }
}

fn read_protected(r: &mut Reader<'_>, protected_len: u16) -> Result<(Vec<u8>, Vec<u8>), DecodeError> {
    let protected = r.bytes(padded_len(protected_len as usize))?.to_vec();
    let tag = r.rest();
    if tag.len() != TAG_LEN {
        return Err(DecodeError::Truncated {
            needed: TAG_LEN,
            remaining: tag.len(),
        });
    }
    Ok((protected, tag.to_vec()))
}

impl ConnectRequestProtected {
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        put_sgstring(&mut out, &self.user_hash)?;
        put_sgstring(&mut out, &self.auth_token)?;
        out.put_u32(self.request_num);
        out.put_u32(self.group_start);
        out.put_u32(self.group_end);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        Ok(Self {
            user_hash: r.sgstring("user_hash")?,
            auth_token: r.sgstring("auth_token")?,
            request_num: r.u32()?,
            group_start: r.u32()?,
            group_end: r.u32()?,
        })
    }
}

impl ConnectResponseProtected {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        out.put_u16(self.result.code());
        out.put_u16(self.pairing_state);
        out.put_u32(self.participant_id);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        Ok(Self {
            result: ConnectResult::from_code(r.u16()?),
            pairing_state: r.u16()?,
            participant_id: r.u32()?,
        })
    }
}
