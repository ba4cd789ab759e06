//! Block cipher and MAC primitives.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Block};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use xsg_proto::{padded_len, BLOCK_LEN, TAG_LEN};

use crate::error::CryptoError;
use crate::utils::constant_time_compare;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Encrypt with AES-128-CBC after padding to the block size.
///
/// Pad bytes carry the pad count; an already aligned plaintext gets no pad
/// block.
pub fn encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let padded = padded_len(plaintext.len());
    let pad = (padded - plaintext.len()) as u8;
    let mut buf = Vec::with_capacity(padded);
    buf.extend_from_slice(plaintext);
    buf.resize(padded, pad);
    Aes128CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<NoPadding>(&buf)
}

/// Decrypt AES-128-CBC and cut the result back to `plain_len` bytes.
pub fn decrypt(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8], plain_len: usize) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() % BLOCK_LEN != 0 || plain_len > ciphertext.len() {
        return Err(CryptoError::InvalidCiphertext);
    }
    let mut plain = Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::InvalidCiphertext)?;
    plain.truncate(plain_len);
    Ok(plain)
}

/// Per-message IV: the first header block encrypted with the IV key.
pub fn message_iv(iv_key: &[u8; 16], header_seed: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(iv_key.into());
    let mut block = Block::clone_from_slice(header_seed);
    cipher.encrypt_block(&mut block);
    let mut out = [0u8; 16];
    out.copy_from_slice(&block);
    out
}

pub fn random_iv() -> Result<[u8; 16], CryptoError> {
    let mut iv = [0u8; 16];
    OsRng.try_fill_bytes(&mut iv).map_err(|_| CryptoError::Rng)?;
    Ok(iv)
}

/// HMAC-SHA256 tag over `data`.
pub fn sign(mac_key: &[u8], data: &[u8]) -> Result<[u8; TAG_LEN], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key).map_err(|_| CryptoError::InvalidKey)?;
    mac.update(data);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

/// Constant-time tag check.
pub fn verify(mac_key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    match sign(mac_key, data) {
        Ok(expected) => constant_time_compare(&expected, tag),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [0x11; 16];
    const IV: [u8; 16] = [0x22; 16];

    #[test]
    fn pads_to_block_with_count_bytes() {
        let ct = encrypt(&KEY, &IV, b"hello");
        assert_eq!(ct.len(), 16);

        let raw = Aes128CbcDec::new((&KEY).into(), (&IV).into())
            .decrypt_padded_vec_mut::<NoPadding>(&ct)
            .unwrap();
        assert_eq!(&raw[..5], b"hello");
        assert!(raw[5..].iter().all(|b| *b == 11));
    }

    #[test]
    fn aligned_plaintext_gets_no_extra_block() {
        let ct = encrypt(&KEY, &IV, &[7u8; 32]);
        assert_eq!(ct.len(), 32);
        assert_eq!(decrypt(&KEY, &IV, &ct, 32).unwrap(), vec![7u8; 32]);
    }

    #[test]
    fn decrypt_rejects_partial_block() {
        assert!(matches!(
            decrypt(&KEY, &IV, &[0u8; 15], 15),
            Err(CryptoError::InvalidCiphertext)
        ));
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        let tag = sign(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(verify(b"Jefe", b"what do ya want for nothing?", &tag));
        assert!(!verify(b"Jefe", b"what do ya want for nothing!", &tag));
    }

    #[test]
    fn message_iv_depends_on_header() {
        let a = message_iv(&KEY, &[0u8; 16]);
        let b = message_iv(&KEY, &[1u8; 16]);
        assert_ne!(a, b);
        assert_eq!(a, message_iv(&KEY, &[0u8; 16]));
    }
}
