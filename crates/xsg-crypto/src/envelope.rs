//! Sealing and opening of protected packets.
//!
//! Message packets: the payload is encrypted with an IV derived from the
//! header, and the tag covers header plus ciphertext. Connect packets carry an
//! explicit IV and their tag covers every preceding byte of the datagram.

use xsg_proto::{
    ConnectRequest, ConnectRequestProtected, ConnectResponse, ConnectResponseProtected, DecodeError,
    MessageHeader, MessagePacket, PublicKeyType, SimplePacket, TAG_LEN,
};

use crate::cipher::{decrypt, encrypt, message_iv, sign, verify};
use crate::error::CryptoError;
use crate::keys::{SessionKeys, PUBLIC_KEY_LEN};

/// Protects packets for one session. Both peers hold the same keys.
#[derive(Debug, Clone)]
pub struct PacketCipher {
    keys: SessionKeys,
}

impl PacketCipher {
    pub fn new(keys: SessionKeys) -> Self {
        Self { keys }
    }

    /// Encrypt `plaintext` under `header` and append the tag.
    ///
    /// `header.protected_len` is overwritten with the plaintext length.
    pub fn seal_message(&self, mut header: MessageHeader, plaintext: &[u8]) -> Result<MessagePacket, CryptoError> {
        header.protected_len = protected_len(plaintext.len())?;
        let raw_header = header.encode();
        let iv = message_iv(&self.keys.iv_key, &iv_seed(&raw_header));
        let protected = encrypt(&self.keys.enc_key, &iv, plaintext);

        let mut signed = Vec::with_capacity(raw_header.len() + protected.len());
        signed.extend_from_slice(&raw_header);
        signed.extend_from_slice(&protected);
        let tag = sign(&self.keys.mac_key, &signed)?;

        Ok(MessagePacket {
            header,
            protected,
            tag: tag.to_vec(),
        })
    }

    /// Verify the tag, then decrypt. A tag mismatch is [`CryptoError::AuthError`].
    pub fn open_message(&self, packet: &MessagePacket) -> Result<Vec<u8>, CryptoError> {
        let raw_header = packet.header.encode();
        let mut signed = Vec::with_capacity(raw_header.len() + packet.protected.len());
        signed.extend_from_slice(&raw_header);
        signed.extend_from_slice(&packet.protected);
        if !verify(&self.keys.mac_key, &signed, &packet.tag) {
            return Err(CryptoError::AuthError);
        }
        let iv = message_iv(&self.keys.iv_key, &iv_seed(&raw_header));
        decrypt(
            &self.keys.enc_key,
            &iv,
            &packet.protected,
            packet.header.protected_len as usize,
        )
    }

    pub fn seal_connect_request(
        &self,
        client_uuid: [u8; 16],
        public_key: &[u8; PUBLIC_KEY_LEN],
        iv: [u8; 16],
        payload: &ConnectRequestProtected,
    ) -> Result<ConnectRequest, CryptoError> {
        let plaintext = payload.encode()?;
        let mut request = ConnectRequest {
            client_uuid,
            public_key_type: PublicKeyType::EcdhP256,
            public_key: public_key.to_vec(),
            iv,
            protected_len: protected_len(plaintext.len())?,
            protected: encrypt(&self.keys.enc_key, &iv, &plaintext),
            tag: vec![0u8; TAG_LEN],
        };
        request.tag = self.connect_tag(SimplePacket::ConnectRequest(request.clone()))?;
        Ok(request)
    }

    pub fn open_connect_request(&self, request: &ConnectRequest) -> Result<ConnectRequestProtected, CryptoError> {
        self.check_connect_tag(SimplePacket::ConnectRequest(request.clone()), &request.tag)?;
        let plain = decrypt(
            &self.keys.enc_key,
            &request.iv,
            &request.protected,
            request.protected_len as usize,
        )?;
        Ok(ConnectRequestProtected::decode(&plain)?)
    }

    pub fn seal_connect_response(
        &self,
        iv: [u8; 16],
        payload: &ConnectResponseProtected,
    ) -> Result<ConnectResponse, CryptoError> {
        let plaintext = payload.encode();
        let mut response = ConnectResponse {
            iv,
            protected_len: protected_len(plaintext.len())?,
            protected: encrypt(&self.keys.enc_key, &iv, &plaintext),
            tag: vec![0u8; TAG_LEN],
        };
        response.tag = self.connect_tag(SimplePacket::ConnectResponse(response.clone()))?;
        Ok(response)
    }

    pub fn open_connect_response(&self, response: &ConnectResponse) -> Result<ConnectResponseProtected, CryptoError> {
        self.check_connect_tag(SimplePacket::ConnectResponse(response.clone()), &response.tag)?;
        let plain = decrypt(
            &self.keys.enc_key,
            &response.iv,
            &response.protected,
            response.protected_len as usize,
        )?;
        Ok(ConnectResponseProtected::decode(&plain)?)
    }

    fn connect_tag(&self, packet: SimplePacket) -> Result<Vec<u8>, CryptoError> {
        let raw = packet.encode()?;
        Ok(sign(&self.keys.mac_key, &raw[..raw.len() - TAG_LEN])?.to_vec())
    }

    fn check_connect_tag(&self, packet: SimplePacket, tag: &[u8]) -> Result<(), CryptoError> {
        let raw = packet.encode()?;
        if verify(&self.keys.mac_key, &raw[..raw.len() - TAG_LEN], tag) {
            Ok(())
        } else {
            Err(CryptoError::AuthError)
        }
    }
}

/// The plaintext length travels in a u16 field.
fn protected_len(len: usize) -> Result<u16, DecodeError> {
    u16::try_from(len).map_err(|_| DecodeError::Malformed {
        field: "protected_payload",
        reason: "payload exceeds 65535 bytes",
    })
}

fn iv_seed(raw_header: &[u8]) -> [u8; 16] {
    let mut seed = [0u8; 16];
    seed.copy_from_slice(&raw_header[..xsg_proto::message::IV_SEED_LEN]);
    seed
}
