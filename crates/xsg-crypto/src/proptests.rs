#[cfg(test)]
mod tests {
    use proptest::collection::vec;
    use proptest::prelude::*;
    use xsg_proto::{MessageFlags, MessageHeader, MessagePacket, MessageType};

    use crate::cipher::{decrypt, encrypt, sign, verify};
    use crate::envelope::PacketCipher;
    use crate::error::CryptoError;
    use crate::keys::SessionKeys;

    fn header(sequence: u32, channel_id: u64) -> MessageHeader {
        MessageHeader {
            protected_len: 0,
            sequence,
            target_participant: 0,
            source_participant: 1,
            flags: MessageFlags::new(MessageType::Json).with_ack(),
            channel_id,
        }
    }

    proptest! {
        // Encryption round trip at the primitive level.
        #[test]
        fn test_encrypt_decrypt_round_trip(
            key in any::<[u8; 16]>(),
            iv in any::<[u8; 16]>(),
            plaintext in vec(any::<u8>(), 0..300),
        ) {
            let ct = encrypt(&key, &iv, &plaintext);
            prop_assert_eq!(ct.len() % 16, 0);
            prop_assert_eq!(decrypt(&key, &iv, &ct, plaintext.len()).unwrap(), plaintext);
        }

        #[test]
        fn test_sign_verify(key in vec(any::<u8>(), 1..64), data in vec(any::<u8>(), 0..256)) {
            let tag = sign(&key, &data).unwrap();
            prop_assert!(verify(&key, &data, &tag));
        }

        // Sealed message round trip.
        #[test]
        fn test_message_round_trip(
            secret in any::<[u8; 32]>(),
            sequence in any::<u32>(),
            channel_id in any::<u64>(),
            plaintext in vec(any::<u8>(), 1..300),
        ) {
            let cipher = PacketCipher::new(SessionKeys::from_shared_secret(&secret));
            let packet = cipher.seal_message(header(sequence, channel_id), &plaintext).unwrap();
            let wire = packet.encode().unwrap();
            let decoded = MessagePacket::decode(&wire).unwrap();
            prop_assert_eq!(cipher.open_message(&decoded).unwrap(), plaintext);
        }

        // Any single-byte mutation of header, ciphertext or tag is caught.
        #[test]
        fn test_single_byte_tamper_detected(
            secret in any::<[u8; 32]>(),
            plaintext in vec(any::<u8>(), 1..200),
            position in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let cipher = PacketCipher::new(SessionKeys::from_shared_secret(&secret));
            let packet = cipher.seal_message(header(7, 0), &plaintext).unwrap();
            let mut wire = packet.encode().unwrap();
            // Type code and length field stay intact so the frame still parses.
            let index = 4 + position.index(wire.len() - 4);
            wire[index] ^= flip;
            if let Ok(decoded) = MessagePacket::decode(&wire) {
                prop_assert!(matches!(cipher.open_message(&decoded), Err(CryptoError::AuthError)));
            }
        }
    }
}
