//! Token key service configuration
//!
//! Loaded from TOML with `figment`, with `TKS_` prefixed environment
//! variables layered on top (`TKS_SHARED_SECRET`,
//! `TKS_KEYSETS__<name>__<setting>`).
//!
//! ```toml
//! shared_secret = "404142434445464748494a4b4c4d4e4f"
//!
//! [keysets.defKeySet]
//! auth_key = "404142434445464748494a4b4c4d4e4f"
//! mac_key = "404142434445464748494a4b4c4d4e4f"
//! kek_key = "404142434445464748494a4b4c4d4e4f"
//! nist_sp800_108_kdf_on_key_version = "00"
//! nist_sp800_108_kdf_use_cuid_as_kdd = false
//!
//! [keysets.defKeySet.master_keys."02"]
//! auth_key = "505152535455565758595a5b5c5d5e5f"
//! mac_key = "505152535455565758595a5b5c5d5e5f"
//! kek_key = "505152535455565758595a5b5c5d5e5f"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keys::{KeyAlgorithm, StaticKeys, SymmetricKey};
use crate::util::parse_version_byte;
use crate::{Error, Result};

/// Scope name used in errors about global settings
pub(crate) const GLOBAL_SCOPE: &str = "tks";

/// Hex encoded key as written in the configuration
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct HexKey(String);

impl HexKey {
    fn parse(
        &self,
        algorithm: KeyAlgorithm,
        scope: &str,
        setting: &'static str,
    ) -> Result<SymmetricKey> {
        SymmetricKey::from_hex(algorithm, &self.0).map_err(|err| Error::InvalidSetting {
            scope: scope.to_owned(),
            setting,
            reason: err.to_string(),
        })
    }
}

impl From<&str> for HexKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Debug for HexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HexKey(..)")
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TksConfig {
    /// Secret shared with the token processing system, used to wrap session keys
    #[serde(default)]
    pub shared_secret: Option<HexKey>,
    /// Algorithm of the shared secret
    #[serde(default)]
    pub shared_secret_algorithm: KeyAlgorithm,
    /// Public key (SPKI DER or PEM file) used to transport server-side generated keys
    #[serde(default)]
    pub transport_key: Option<PathBuf>,
    /// Key sets by name
    #[serde(default)]
    pub keysets: BTreeMap<String, KeySetConfig>,
}

/// Configuration of one key set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySetConfig {
    /// Developer ENC (authentication) key
    #[serde(default)]
    pub auth_key: Option<HexKey>,
    /// Developer MAC key
    #[serde(default)]
    pub mac_key: Option<HexKey>,
    /// Developer key encryption key
    #[serde(default)]
    pub kek_key: Option<HexKey>,
    /// Algorithm of every key in the set
    #[serde(default)]
    pub key_algorithm: KeyAlgorithm,
    /// Legacy diversification scheme (`emv`, `visa2`, `none`); `emv` when absent
    #[serde(default)]
    pub diversification: Option<String>,
    /// First key version derived with the NIST SP800-108 KDF (hex byte)
    #[serde(default)]
    pub nist_sp800_108_kdf_on_key_version: Option<String>,
    /// Use the CUID instead of the KDD as NIST SP800-108 context
    #[serde(default)]
    pub nist_sp800_108_kdf_use_cuid_as_kdd: Option<bool>,
    /// Master keys by version (hex byte)
    #[serde(default)]
    pub master_keys: BTreeMap<String, MasterKeyConfig>,
}

/// One master key version of a key set
#[derive(Debug, Clone, Deserialize)]
pub struct MasterKeyConfig {
    /// ENC (authentication) master key
    pub auth_key: HexKey,
    /// MAC master key
    pub mac_key: HexKey,
    /// Key encryption master key
    pub kek_key: HexKey,
}

impl TksConfig {
    /// Load the configuration from a TOML file and the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TKS_").split("__"))
            .extract()?)
    }

    /// Parse the configuration from a TOML string
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Ok(Figment::from(Toml::string(toml)).extract()?)
    }

    /// Look up a key set by name
    pub fn key_set(&self, name: &str) -> Result<&KeySetConfig> {
        self.keysets
            .get(name)
            .ok_or_else(|| Error::UnknownKeySet(name.to_owned()))
    }

    /// The shared secret as a key
    pub fn shared_secret(&self) -> Result<SymmetricKey> {
        self.shared_secret
            .as_ref()
            .ok_or_else(|| Error::MissingSetting {
                scope: GLOBAL_SCOPE.to_owned(),
                setting: "shared_secret",
            })?
            .parse(self.shared_secret_algorithm, GLOBAL_SCOPE, "shared_secret")
    }
}

impl KeySetConfig {
    /// Developer keys, when all three are configured
    pub fn developer_keys(&self, name: &str) -> Result<Option<StaticKeys>> {
        match (&self.auth_key, &self.mac_key, &self.kek_key) {
            (None, None, None) => Ok(None),
            (Some(enc), Some(mac), Some(kek)) => Ok(Some(self.static_keys(name, enc, mac, kek)?)),
            _ => Err(Error::InvalidSetting {
                scope: name.to_owned(),
                setting: "auth_key",
                reason: "auth_key, mac_key and kek_key must be configured together".into(),
            }),
        }
    }

    /// Master keys of every configured version
    pub fn master_key_versions(&self, name: &str) -> Result<Vec<(u8, StaticKeys)>> {
        self.master_keys
            .iter()
            .map(|(version, keys)| {
                let version = parse_version_byte(version).ok_or_else(|| Error::InvalidSetting {
                    scope: name.to_owned(),
                    setting: "master_keys",
                    reason: format!("{version:?} is not a key version byte"),
                })?;
                let keys = self.static_keys(name, &keys.auth_key, &keys.mac_key, &keys.kek_key)?;
                Ok((version, keys))
            })
            .collect()
    }

    fn static_keys(
        &self,
        name: &str,
        enc: &HexKey,
        mac: &HexKey,
        kek: &HexKey,
    ) -> Result<StaticKeys> {
        let algorithm = self.key_algorithm;
        StaticKeys::new(
            enc.parse(algorithm, name, "auth_key")?,
            mac.parse(algorithm, name, "mac_key")?,
            kek.parse(algorithm, name, "kek_key")?,
        )
    }
}
