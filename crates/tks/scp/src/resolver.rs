//! Protocol parameter resolution
//!
//! Turns a key set's configuration and the key info of a request into the
//! parameters of one derivation: which KDF applies, which identity bytes
//! feed it and which diversification layout the legacy KDF uses.

use tracing::debug;

use crate::config::KeySetConfig;
use crate::diversify::DiversificationScheme;
use crate::kdf::KdfScheme;
use crate::types::{CardIdentity, KeyInfo, KeyVersion, Protocol};
use crate::util::parse_version_byte;
use crate::{Error, Result};

/// Derivation parameters for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolParameters {
    /// Secure channel protocol
    pub protocol: Protocol,
    /// Parsed key info of the request
    pub key_info: KeyInfo,
    /// Selected card key derivation
    pub kdf: KdfScheme,
    /// First key version using NIST SP800-108
    pub kdf_threshold: KeyVersion,
    /// Use the CUID rather than the KDD as NIST SP800-108 context
    pub cuid_as_kdd: bool,
    /// Legacy diversification layout
    pub diversification: DiversificationScheme,
}

impl ProtocolParameters {
    /// Context bytes for the NIST SP800-108 KDF
    pub const fn kdf_context<'a>(&self, identity: &'a CardIdentity) -> &'a [u8] {
        if self.cuid_as_kdd {
            identity.cuid()
        } else {
            identity.kdd()
        }
    }
}

/// Select the KDF for a key version
///
/// NIST SP800-108 applies at and above the threshold; both sides compare as
/// unsigned bytes.
pub const fn select_kdf(version: KeyVersion, threshold: KeyVersion) -> KdfScheme {
    if version.at_least(threshold) {
        KdfScheme::NistSp800_108
    } else {
        KdfScheme::Legacy
    }
}

/// Resolve the derivation parameters of a request against a key set
pub fn resolve(
    key_set: &str,
    config: &KeySetConfig,
    key_info: &[u8],
    protocol: Protocol,
) -> Result<ProtocolParameters> {
    let key_info = KeyInfo::for_protocol(key_info, protocol)?;

    let threshold = config
        .nist_sp800_108_kdf_on_key_version
        .as_deref()
        .ok_or_else(|| missing(key_set, "nist_sp800_108_kdf_on_key_version"))?;
    let threshold = parse_version_byte(threshold)
        .map(KeyVersion)
        .ok_or_else(|| Error::InvalidSetting {
            scope: key_set.to_owned(),
            setting: "nist_sp800_108_kdf_on_key_version",
            reason: format!("{threshold:?} is not a key version byte"),
        })?;

    let cuid_as_kdd = config
        .nist_sp800_108_kdf_use_cuid_as_kdd
        .ok_or_else(|| missing(key_set, "nist_sp800_108_kdf_use_cuid_as_kdd"))?;

    let diversification = match config.diversification.as_deref() {
        None => DiversificationScheme::default(),
        Some(value) => value.parse().map_err(|reason| Error::InvalidSetting {
            scope: key_set.to_owned(),
            setting: "diversification",
            reason,
        })?,
    };

    let expected = protocol.key_algorithm();
    if config.key_algorithm != expected {
        return Err(Error::InvalidSetting {
            scope: key_set.to_owned(),
            setting: "key_algorithm",
            reason: format!("{protocol} requires {expected} keys"),
        });
    }

    let kdf = select_kdf(key_info.version, threshold);
    debug!(
        key_set,
        %protocol,
        version = %key_info.version,
        threshold = %threshold,
        ?kdf,
        cuid_as_kdd,
        ?diversification,
        "resolved protocol parameters"
    );

    Ok(ProtocolParameters {
        protocol,
        key_info,
        kdf,
        kdf_threshold: threshold,
        cuid_as_kdd,
        diversification,
    })
}

fn missing(key_set: &str, setting: &'static str) -> Error {
    Error::MissingSetting {
        scope: key_set.to_owned(),
        setting,
    }
}
