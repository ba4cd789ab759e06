//! Key material: P-256 key pairs, console certificates and the session key
//! expansion.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePrivateKey;
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;
use sha2::{Digest, Sha512};
use x509_parser::prelude::{FromDer, X509Certificate};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Uncompressed X||Y length of a P-256 public key on the wire.
pub const PUBLIC_KEY_LEN: usize = 64;

const KDF_PREFIX: [u8; 8] = [0xd6, 0x37, 0xf1, 0xaa, 0xe2, 0xf0, 0x41, 0x8c];
const KDF_SUFFIX: [u8; 8] = [0xa8, 0xf8, 0x1a, 0x57, 0x4e, 0x22, 0x8a, 0xb7];

/// A P-256 key pair. The client generates a fresh one per handshake.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Load a PKCS#8 DER private key (used for long-lived console keys).
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_pkcs8_der(der).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { secret })
    }

    /// Public key as X||Y.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let point = self.secret.public_key().to_encoded_point(false);
        let mut out = [0u8; PUBLIC_KEY_LEN];
        // Skip the 0x04 uncompressed-point marker.
        out.copy_from_slice(&point.as_bytes()[1..]);
        out
    }

    /// ECDH with the peer's X||Y public key, returning the shared x coordinate.
    fn shared_secret(&self, peer_public: &[u8]) -> Result<[u8; 32], CryptoError> {
        let peer = parse_public_key(peer_public)?;
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        let mut out = [0u8; 32];
        out.copy_from_slice(shared.raw_secret_bytes());
        Ok(out)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}

fn parse_public_key(raw: &[u8]) -> Result<PublicKey, CryptoError> {
    if raw.len() != PUBLIC_KEY_LEN {
        return Err(CryptoError::InvalidPublicKey);
    }
    let mut sec1 = [0u8; PUBLIC_KEY_LEN + 1];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(raw);
    PublicKey::from_sec1_bytes(&sec1).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Symmetric keys for one session.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub enc_key: [u8; 16],
    pub iv_key: [u8; 16],
    pub mac_key: [u8; 32],
}

impl SessionKeys {
    /// Expand a shared secret into the encryption, IV and MAC keys.
    pub fn from_shared_secret(shared: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(KDF_PREFIX);
        hasher.update(shared);
        hasher.update(KDF_SUFFIX);
        let mut digest = [0u8; 64];
        digest.copy_from_slice(&hasher.finalize());

        let mut keys = Self {
            enc_key: [0u8; 16],
            iv_key: [0u8; 16],
            mac_key: [0u8; 32],
        };
        keys.enc_key.copy_from_slice(&digest[..16]);
        keys.iv_key.copy_from_slice(&digest[16..32]);
        keys.mac_key.copy_from_slice(&digest[32..]);
        digest.zeroize();
        keys
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys([redacted])")
    }
}

/// Derive session keys from our key pair and the peer's X||Y public key.
///
/// Fails with [`CryptoError::InvalidPublicKey`] when the peer key is not on
/// the curve; the handshake attempt must then be abandoned.
pub fn derive_session_keys(local: &KeyPair, peer_public: &[u8]) -> Result<SessionKeys, CryptoError> {
    let mut shared = local.shared_secret(peer_public)?;
    let keys = SessionKeys::from_shared_secret(&shared);
    shared.zeroize();
    Ok(keys)
}

/// The fields of a console certificate the client relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleCertificate {
    /// Subject common name: the console's device id.
    pub live_id: String,
    pub public_key: [u8; PUBLIC_KEY_LEN],
}

impl ConsoleCertificate {
    pub fn parse(der: &[u8]) -> Result<Self, CryptoError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;

        let live_id = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .ok_or_else(|| CryptoError::InvalidCertificate("missing common name".into()))?
            .to_string();

        let point = cert.public_key().subject_public_key.data.as_ref();
        if point.len() != PUBLIC_KEY_LEN + 1 || point[0] != 0x04 {
            return Err(CryptoError::InvalidCertificate(
                "subject key is not an uncompressed P-256 point".into(),
            ));
        }
        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(&point[1..]);
        parse_public_key(&public_key)?;

        Ok(Self { live_id, public_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_keys() {
        let client = KeyPair::generate();
        let console = KeyPair::generate();

        let a = derive_session_keys(&client, &console.public_bytes()).unwrap();
        let b = derive_session_keys(&console, &client.public_bytes()).unwrap();
        assert_eq!(a.enc_key, b.enc_key);
        assert_eq!(a.iv_key, b.iv_key);
        assert_eq!(a.mac_key, b.mac_key);
        assert_ne!(a.enc_key, a.iv_key);
    }

    #[test]
    fn kdf_splits_sha512_digest() {
        let keys = SessionKeys::from_shared_secret(&[0u8; 32]);
        let mut hasher = Sha512::new();
        hasher.update(KDF_PREFIX);
        hasher.update([0u8; 32]);
        hasher.update(KDF_SUFFIX);
        let digest = hasher.finalize();
        assert_eq!(&keys.enc_key[..], &digest[..16]);
        assert_eq!(&keys.iv_key[..], &digest[16..32]);
        assert_eq!(&keys.mac_key[..], &digest[32..]);
    }

    #[test]
    fn rejects_off_curve_peer_key() {
        let client = KeyPair::generate();
        assert!(matches!(
            derive_session_keys(&client, &[0x01; PUBLIC_KEY_LEN]),
            Err(CryptoError::InvalidPublicKey)
        ));
        assert!(matches!(
            derive_session_keys(&client, &[0x01; 10]),
            Err(CryptoError::InvalidPublicKey)
        ));
    }

    #[test]
    fn certificate_yields_live_id_and_key() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "FD00112233FFEE66");
        let cert = params.self_signed(&key_pair).unwrap();

        let parsed = ConsoleCertificate::parse(cert.der()).unwrap();
        assert_eq!(parsed.live_id, "FD00112233FFEE66");

        let console = KeyPair::from_pkcs8_der(&key_pair.serialize_der()).unwrap();
        assert_eq!(parsed.public_key, console.public_bytes());
    }

    #[test]
    fn garbage_certificate_is_rejected() {
        assert!(matches!(
            ConsoleCertificate::parse(&[0x30, 0x03, 0x01, 0x02]),
            Err(CryptoError::InvalidCertificate(_))
        ));
    }
}
