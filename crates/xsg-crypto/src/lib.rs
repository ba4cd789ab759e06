//! Session cryptography for the console LAN protocol.
//!
//! P-256 ECDH against the console certificate key, SHA-512 key expansion,
//! AES-128-CBC payload encryption and HMAC-SHA256 integrity tags.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod utils;

pub use cipher::{decrypt, encrypt, message_iv, random_iv, sign, verify};
pub use envelope::PacketCipher;
pub use error::CryptoError;
pub use keys::{derive_session_keys, ConsoleCertificate, KeyPair, SessionKeys, PUBLIC_KEY_LEN};

#[cfg(test)]
mod proptests;
