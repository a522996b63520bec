//! Cryptographic token abstraction
//!
//! A token holds the master keys of the configured key sets and supplies
//! randomness. [`SoftToken`] keeps the keys in memory; providers that cannot
//! be used from several threads at once are wrapped in [`SerializedToken`].

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rand::TryRngCore;
use rand::rngs::OsRng;
use tracing::debug;

use crate::config::TksConfig;
use crate::constants::DEVELOPER_KEY_VERSION;
use crate::error::TokenError;
use crate::keys::StaticKeys;
use crate::types::KeyVersion;
use crate::Result;

/// Source of master keys and randomness
pub trait Token {
    /// Token name, for logging
    fn name(&self) -> &str;

    /// Master keys of a key set at a version
    fn master_keys(&self, key_set: &str, version: KeyVersion) -> Result<StaticKeys>;

    /// Fill a buffer from the token's CSPRNG
    fn fill_random(&self, buf: &mut [u8]) -> Result<()>;
}

impl<T: Token + ?Sized> Token for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn master_keys(&self, key_set: &str, version: KeyVersion) -> Result<StaticKeys> {
        (**self).master_keys(key_set, version)
    }

    fn fill_random(&self, buf: &mut [u8]) -> Result<()> {
        (**self).fill_random(buf)
    }
}

/// In-memory software token
#[derive(Debug, Default)]
pub struct SoftToken {
    name: String,
    keys: BTreeMap<(String, u8), StaticKeys>,
}

impl SoftToken {
    /// Create an empty token
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: BTreeMap::new(),
        }
    }

    /// Build a token holding every key configured for every key set
    ///
    /// Developer keys are stored under version `01`; explicit master keys for
    /// that version take precedence.
    pub fn from_config(config: &TksConfig) -> Result<Self> {
        let mut token = Self::new("internal");
        for (name, key_set) in &config.keysets {
            if let Some(keys) = key_set.developer_keys(name)? {
                token.insert(name, KeyVersion(DEVELOPER_KEY_VERSION), keys);
            }
            for (version, keys) in key_set.master_key_versions(name)? {
                token.insert(name, KeyVersion(version), keys);
            }
        }
        debug!(token = %token.name, entries = token.keys.len(), "loaded software token");
        Ok(token)
    }

    /// Store master keys, replacing any previous keys at that version
    pub fn insert(&mut self, key_set: &str, version: KeyVersion, keys: StaticKeys) {
        self.keys.insert((key_set.to_owned(), version.value()), keys);
    }
}

impl Token for SoftToken {
    fn name(&self) -> &str {
        &self.name
    }

    fn master_keys(&self, key_set: &str, version: KeyVersion) -> Result<StaticKeys> {
        self.keys
            .get(&(key_set.to_owned(), version.value()))
            .cloned()
            .ok_or_else(|| {
                TokenError::KeyNotFound {
                    key_set: key_set.to_owned(),
                    version: version.value(),
                }
                .into()
            })
    }

    fn fill_random(&self, buf: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|err| TokenError::Random(err.to_string()).into())
    }
}

/// Token whose operations run one at a time
#[derive(Debug)]
pub struct SerializedToken<T> {
    name: String,
    inner: Mutex<T>,
}

impl<T: Token> SerializedToken<T> {
    /// Wrap a token
    pub fn new(token: T) -> Self {
        Self {
            name: token.name().to_owned(),
            inner: Mutex::new(token),
        }
    }
}

impl<T: Token> Token for SerializedToken<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn master_keys(&self, key_set: &str, version: KeyVersion) -> Result<StaticKeys> {
        self.inner.lock().master_keys(key_set, version)
    }

    fn fill_random(&self, buf: &mut [u8]) -> Result<()> {
        self.inner.lock().fill_random(buf)
    }
}
