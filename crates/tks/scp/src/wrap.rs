//! Key wrapping and transport
//!
//! Session keys leave the service encrypted under the secret shared with
//! the token processing system. Keys generated on the server side are
//! wrapped twice: under the card's data encryption key, and under the public
//! transport key of the key archival service.

use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::constants::put_key::KCV_LEN;
use crate::crypto::{decrypt_ecb, encrypt_ecb};
use crate::error::Status;
use crate::keys::{KeyAlgorithm, SymmetricKey};
use crate::token::Token;
use crate::util::{set_des_parity, to_array};
use crate::{Error, Result};

/// Length of an uncompressed P-256 point
const EC_POINT_LEN: usize = 65;

/// Length of generated symmetric keys
const GENERATED_KEY_LEN: usize = 16;

/// Key check value
pub type KeyCheckValue = [u8; KCV_LEN];

/// Encrypted key material
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    /// Wrapped bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for WrappedKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for WrappedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({})", hex::encode(&self.0))
    }
}

/// Wrap a key in ECB mode under a key encryption key
pub fn wrap_under_key(kek: &SymmetricKey, key: &SymmetricKey) -> Result<WrappedKey> {
    let wrapped = encrypt_ecb(kek, key.as_bytes())?;
    Ok(WrappedKey(wrapped.to_vec()))
}

/// Unwrap a key wrapped by [`wrap_under_key`]
pub fn unwrap_under_key(
    kek: &SymmetricKey,
    wrapped: &[u8],
    algorithm: KeyAlgorithm,
) -> Result<SymmetricKey> {
    let key = decrypt_ecb(kek, wrapped)?;
    SymmetricKey::new(algorithm, &key)
}

/// Transport secret shared with the token processing system
#[derive(Debug, Clone)]
pub struct SharedSecret(SymmetricKey);

impl SharedSecret {
    /// Use a key as shared secret
    pub const fn new(key: SymmetricKey) -> Self {
        Self(key)
    }

    /// Underlying key
    pub const fn key(&self) -> &SymmetricKey {
        &self.0
    }
}

/// Wrap a key under the shared secret
pub fn wrap_under_shared_secret(secret: &SharedSecret, key: &SymmetricKey) -> Result<WrappedKey> {
    wrap_under_key(&secret.0, key)
}

/// Unwrap a key wrapped under the shared secret
pub fn unwrap_under_shared_secret(
    secret: &SharedSecret,
    wrapped: &[u8],
    algorithm: KeyAlgorithm,
) -> Result<SymmetricKey> {
    unwrap_under_key(&secret.0, wrapped, algorithm)
}

/// Compute the key check value of a key
///
/// DES3 keys encrypt eight zero bytes, AES keys sixteen `01` bytes; the
/// check value is the first three bytes of the result.
pub fn compute_key_check_value(key: &SymmetricKey) -> Result<KeyCheckValue> {
    let encrypted = match key.algorithm() {
        KeyAlgorithm::Des3 => encrypt_ecb(key, &[0x00; 8])?,
        KeyAlgorithm::Aes => encrypt_ecb(key, &[0x01; 16])?,
    };
    to_array("key check value", &encrypted[..KCV_LEN])
}

/// Generate a random key from the token's CSPRNG
///
/// DES3 keys get odd parity on every byte.
pub fn generate_ephemeral_key<T: Token + ?Sized>(
    token: &T,
    algorithm: KeyAlgorithm,
) -> Result<SymmetricKey> {
    let mut bytes = Zeroizing::new([0u8; GENERATED_KEY_LEN]);
    token.fill_random(&mut bytes[..])?;
    if algorithm == KeyAlgorithm::Des3 {
        set_des_parity(&mut bytes[..]);
    }
    SymmetricKey::new(algorithm, &bytes[..])
}

/// Public key of a key archival service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKey {
    /// RSA key, wrapping with PKCS#1 v1.5
    Rsa(RsaPublicKey),
    /// P-256 key, wrapping with ephemeral ECDH and AES
    Ec(p256::PublicKey),
}

impl TransportKey {
    /// Parse a DER encoded SubjectPublicKeyInfo
    pub fn from_der(der: &[u8]) -> Result<Self> {
        use p256::pkcs8::DecodePublicKey as _;
        use rsa::pkcs8::DecodePublicKey as _;

        if let Ok(key) = RsaPublicKey::from_public_key_der(der) {
            return Ok(Self::Rsa(key));
        }
        p256::PublicKey::from_public_key_der(der)
            .map(Self::Ec)
            .map_err(|err| Error::Wrap(format!("unsupported transport key: {err}")))
    }

    /// Parse a PEM encoded SubjectPublicKeyInfo
    pub fn from_pem(pem: &str) -> Result<Self> {
        use p256::pkcs8::DecodePublicKey as _;
        use rsa::pkcs8::DecodePublicKey as _;

        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        p256::PublicKey::from_public_key_pem(pem)
            .map(Self::Ec)
            .map_err(|err| Error::Wrap(format!("unsupported transport key: {err}")))
    }

    /// Parse a PEM or DER encoded key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match std::str::from_utf8(bytes) {
            Ok(pem) if pem.trim_start().starts_with("-----BEGIN") => Self::from_pem(pem),
            _ => Self::from_der(bytes),
        }
    }
}

/// Wrap a key under a transport public key
///
/// RSA keys encrypt the key bytes with PKCS#1 v1.5. EC keys agree an
/// ephemeral P-256 secret, hash its x-coordinate with SHA-256 into an AES-256
/// key and encrypt the key bytes in ECB mode; the output is the uncompressed
/// ephemeral point followed by the ciphertext.
pub fn wrap_under_public_key(key: &SymmetricKey, transport: &TransportKey) -> Result<WrappedKey> {
    match transport {
        TransportKey::Rsa(public) => {
            let wrapped = public
                .encrypt(&mut rand_v8::rngs::OsRng, Pkcs1v15Encrypt, key.as_bytes())
                .map_err(|err| Error::Wrap(err.to_string()))?;
            Ok(WrappedKey(wrapped))
        }
        TransportKey::Ec(public) => {
            let ephemeral = p256::SecretKey::random(&mut rand_v8::rngs::OsRng);
            let kek = ecdh_wrapping_key(&ephemeral, public)?;
            let ciphertext = encrypt_ecb(&kek, key.as_bytes())?;

            let point = ephemeral.public_key().to_encoded_point(false);
            let mut wrapped = Vec::with_capacity(EC_POINT_LEN + ciphertext.len());
            wrapped.extend_from_slice(point.as_bytes());
            wrapped.extend_from_slice(&ciphertext);
            Ok(WrappedKey(wrapped))
        }
    }
}

/// Unwrap a key wrapped under a P-256 transport key
pub fn unwrap_under_ec_private_key(
    wrapped: &[u8],
    secret: &p256::SecretKey,
    algorithm: KeyAlgorithm,
) -> Result<SymmetricKey> {
    if wrapped.len() <= EC_POINT_LEN {
        return Err(Error::Wrap("wrapped key too short".into()));
    }
    let (point, ciphertext) = wrapped.split_at(EC_POINT_LEN);
    let ephemeral = p256::PublicKey::from_sec1_bytes(point)
        .map_err(|_| Error::Wrap("invalid ephemeral point".into()))?;
    let kek = ecdh_wrapping_key(secret, &ephemeral)?;
    let key = decrypt_ecb(&kek, ciphertext)?;
    SymmetricKey::new(algorithm, &key)
}

fn ecdh_wrapping_key(secret: &p256::SecretKey, public: &p256::PublicKey) -> Result<SymmetricKey> {
    let shared =
        p256::elliptic_curve::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let mut digest: [u8; 32] = Sha256::digest(shared.raw_secret_bytes()).into();
    let key = SymmetricKey::aes(&digest);
    digest.zeroize();
    key
}

/// Key material produced by server-side key generation
#[derive(Debug, Clone)]
pub struct ServerSideKeyMaterial {
    /// Generated key wrapped under the card's data encryption key
    pub kek_wrapped: WrappedKey,
    /// Generated key wrapped under the transport key
    pub transport_wrapped: WrappedKey,
    /// Key check value of the generated key
    pub key_check: KeyCheckValue,
}

/// Outcome of the optional server-side key generation
#[derive(Debug, Clone, Default)]
pub enum ServerSideKeygen {
    /// Not requested
    #[default]
    NotRequested,
    /// Generated and wrapped
    Generated(ServerSideKeyMaterial),
    /// Requested but failed; the rest of the response is still valid
    Failed(Status),
}

impl ServerSideKeygen {
    /// Key material, when generated
    pub const fn material(&self) -> Option<&ServerSideKeyMaterial> {
        match self {
            Self::Generated(material) => Some(material),
            Self::NotRequested | Self::Failed(_) => None,
        }
    }
}

/// Generate a key and wrap it under the card's data encryption key and a
/// transport key
pub fn server_side_keygen<T: Token + ?Sized>(
    token: &T,
    kek: &SymmetricKey,
    transport: &TransportKey,
) -> Result<ServerSideKeyMaterial> {
    let key = generate_ephemeral_key(token, kek.algorithm())
        .map_err(|err| Error::KeyGeneration(err.to_string()))?;
    let material = ServerSideKeyMaterial {
        kek_wrapped: wrap_under_key(kek, &key)?,
        transport_wrapped: wrap_under_public_key(&key, transport)?,
        key_check: compute_key_check_value(&key)?,
    };
    debug!(
        token = token.name(),
        algorithm = %key.algorithm(),
        "generated server-side key"
    );
    Ok(material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SoftToken;
    use hex_literal::hex;
    use rsa::RsaPrivateKey;

    const KEY: [u8; 16] = hex!("404142434445464748494a4b4c4d4e4f");

    #[test]
    fn test_key_check_values() {
        let des = SymmetricKey::des3(&KEY).unwrap();
        assert_eq!(compute_key_check_value(&des).unwrap(), hex!("8baf47"));
        let aes = SymmetricKey::aes(&KEY).unwrap();
        assert_eq!(compute_key_check_value(&aes).unwrap(), hex!("504a77"));
    }

    #[test]
    fn test_shared_secret_wrap() {
        let secret = SharedSecret::new(SymmetricKey::des3(&KEY).unwrap());
        let key = SymmetricKey::des3(&hex!("5a9402ddabc5b9497bbece0884929b83")).unwrap();
        let wrapped = wrap_under_shared_secret(&secret, &key).unwrap();
        assert_eq!(wrapped.as_bytes(), hex!("d0b7914ef5fcfeb077bc06f94929c0c9"));

        let unwrapped =
            unwrap_under_shared_secret(&secret, wrapped.as_bytes(), KeyAlgorithm::Des3).unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn test_generated_des_key_parity() {
        let token = SoftToken::new("test");
        let key = generate_ephemeral_key(&token, KeyAlgorithm::Des3).unwrap();
        assert_eq!(key.len(), 16);
        assert!(key.as_bytes().iter().all(|b| b.count_ones() % 2 == 1));

        let key = generate_ephemeral_key(&token, KeyAlgorithm::Aes).unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Aes);
    }

    #[test]
    fn test_ec_transport_round_trip() {
        let secret = p256::SecretKey::random(&mut rand_v8::rngs::OsRng);
        let transport = TransportKey::Ec(secret.public_key());
        let key = SymmetricKey::aes(&KEY).unwrap();

        let wrapped = wrap_under_public_key(&key, &transport).unwrap();
        assert_eq!(wrapped.as_bytes().len(), 65 + 16);
        assert_eq!(wrapped.as_bytes()[0], 0x04);

        let unwrapped =
            unwrap_under_ec_private_key(wrapped.as_bytes(), &secret, KeyAlgorithm::Aes).unwrap();
        assert_eq!(unwrapped, key);

        assert!(unwrap_under_ec_private_key(&[0x04; 10], &secret, KeyAlgorithm::Aes).is_err());
    }

    #[test]
    fn test_rsa_transport_wrap() {
        let private = RsaPrivateKey::new(&mut rand_v8::rngs::OsRng, 1024).unwrap();
        let transport = TransportKey::Rsa(private.to_public_key());
        let key = SymmetricKey::des3(&KEY).unwrap();

        let wrapped = wrap_under_public_key(&key, &transport).unwrap();
        assert_eq!(wrapped.as_bytes().len(), 128);
        let plain = private.decrypt(Pkcs1v15Encrypt, wrapped.as_bytes()).unwrap();
        assert_eq!(plain, KEY);
    }

    #[test]
    fn test_transport_key_from_der() {
        use p256::pkcs8::EncodePublicKey;

        let secret = p256::SecretKey::random(&mut rand_v8::rngs::OsRng);
        let der = secret.public_key().to_public_key_der().unwrap();
        let parsed = TransportKey::from_bytes(der.as_bytes()).unwrap();
        assert_eq!(parsed, TransportKey::Ec(secret.public_key()));

        assert!(TransportKey::from_der(&[0x30, 0x00]).is_err());
    }

    #[test]
    fn test_server_side_keygen() {
        let token = SoftToken::new("test");
        let kek = SymmetricKey::des3(&KEY).unwrap();
        let secret = p256::SecretKey::random(&mut rand_v8::rngs::OsRng);
        let transport = TransportKey::Ec(secret.public_key());

        let material = server_side_keygen(&token, &kek, &transport).unwrap();
        let from_kek =
            unwrap_under_key(&kek, material.kek_wrapped.as_bytes(), KeyAlgorithm::Des3).unwrap();
        let from_transport = unwrap_under_ec_private_key(
            material.transport_wrapped.as_bytes(),
            &secret,
            KeyAlgorithm::Des3,
        )
        .unwrap();
        assert_eq!(from_kek, from_transport);
        assert_eq!(compute_key_check_value(&from_kek).unwrap(), material.key_check);
    }
}
