//! Symmetric key material
//!
//! Keys are held in owned buffers that are zeroized on drop and never
//! printed by their `Debug` implementation.

use std::fmt;

use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

/// Block cipher family of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    /// Triple DES (two or three key)
    #[default]
    Des3,
    /// AES
    Aes,
}

impl KeyAlgorithm {
    /// Cipher block size in bytes
    pub const fn block_size(self) -> usize {
        match self {
            Self::Des3 => 8,
            Self::Aes => 16,
        }
    }

    /// Whether `len` is a valid key length for this algorithm
    pub const fn valid_key_len(self, len: usize) -> bool {
        match self {
            Self::Des3 => matches!(len, 16 | 24),
            Self::Aes => matches!(len, 16 | 24 | 32),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Des3 => f.write_str("DES3"),
            Self::Aes => f.write_str("AES"),
        }
    }
}

/// Symmetric key with its algorithm
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    #[zeroize(skip)]
    algorithm: KeyAlgorithm,
    bytes: Vec<u8>,
}

impl SymmetricKey {
    /// Create a key, validating its length for the algorithm
    pub fn new(algorithm: KeyAlgorithm, bytes: &[u8]) -> Result<Self> {
        if !algorithm.valid_key_len(bytes.len()) {
            return Err(Error::InvalidParameter {
                name: "key",
                reason: format!("{} bytes is not a valid {} key length", bytes.len(), algorithm),
            });
        }
        Ok(Self {
            algorithm,
            bytes: bytes.to_vec(),
        })
    }

    /// Create a triple DES key
    pub fn des3(bytes: &[u8]) -> Result<Self> {
        Self::new(KeyAlgorithm::Des3, bytes)
    }

    /// Create an AES key
    pub fn aes(bytes: &[u8]) -> Result<Self> {
        Self::new(KeyAlgorithm::Aes, bytes)
    }

    /// Parse a hex encoded key
    pub fn from_hex(algorithm: KeyAlgorithm, value: &str) -> Result<Self> {
        let mut bytes = hex::decode(value.trim()).map_err(|err| Error::InvalidParameter {
            name: "key",
            reason: err.to_string(),
        })?;
        let key = Self::new(algorithm, &bytes);
        bytes.zeroize();
        key
    }

    /// Key algorithm
    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the key is empty (never true for a constructed key)
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &self.algorithm)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Purpose of a static key within a key set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Encryption / authentication key
    Enc,
    /// MAC key
    Mac,
    /// Key encryption key (DEK in SCP02/SCP03 terms)
    Kek,
}

impl KeyType {
    /// All key types in key set order
    pub const ALL: [Self; 3] = [Self::Enc, Self::Mac, Self::Kek];
}

/// The three static keys of a master key set or a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticKeys {
    enc: SymmetricKey,
    mac: SymmetricKey,
    kek: SymmetricKey,
}

impl StaticKeys {
    /// Create a key set; all keys must share one algorithm
    pub fn new(enc: SymmetricKey, mac: SymmetricKey, kek: SymmetricKey) -> Result<Self> {
        if enc.algorithm() != mac.algorithm() || enc.algorithm() != kek.algorithm() {
            return Err(Error::InvalidParameter {
                name: "key set",
                reason: "keys use different algorithms".into(),
            });
        }
        Ok(Self { enc, mac, kek })
    }

    /// Create a key set where all keys are the same
    pub fn from_single_key(key: SymmetricKey) -> Self {
        Self {
            enc: key.clone(),
            mac: key.clone(),
            kek: key,
        }
    }

    /// Encryption key
    pub const fn enc(&self) -> &SymmetricKey {
        &self.enc
    }

    /// MAC key
    pub const fn mac(&self) -> &SymmetricKey {
        &self.mac
    }

    /// Key encryption key
    pub const fn kek(&self) -> &SymmetricKey {
        &self.kek
    }

    /// Key for a purpose
    pub const fn get(&self, key_type: KeyType) -> &SymmetricKey {
        match key_type {
            KeyType::Enc => &self.enc,
            KeyType::Mac => &self.mac,
            KeyType::Kek => &self.kek,
        }
    }

    /// Algorithm shared by the keys
    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.enc.algorithm()
    }
}
