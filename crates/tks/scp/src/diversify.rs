//! Legacy key diversification
//!
//! Card keys are the master keys encrypted in ECB mode over sixteen bytes of
//! diversification data built from the card identity and the key purpose.

use std::str::FromStr;

use tracing::{trace, warn};

use crate::constants::diversification::{ENC, KEK, LEFT, MAC, RIGHT};
use crate::crypto::encrypt_ecb;
use crate::kdf::derive_card_keys;
use crate::keys::{KeyType, StaticKeys, SymmetricKey};
use crate::resolver::ProtocolParameters;
use crate::types::CardIdentity;
use crate::Result;

/// Layout of the diversification data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiversificationScheme {
    /// EMV CPS v1.1, built from the KDD
    #[default]
    Emv,
    /// Visa2 (legacy version 1), built from the CUID
    Visa2,
    /// No diversification; the master keys are the card keys
    None,
}

impl FromStr for DiversificationScheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emv" => Ok(Self::Emv),
            "visa2" | "v1" | "version1" => Ok(Self::Visa2),
            "none" => Ok(Self::None),
            other => Err(format!("unknown diversification scheme {other:?}")),
        }
    }
}

const fn type_byte(key_type: KeyType) -> u8 {
    match key_type {
        KeyType::Enc => ENC,
        KeyType::Mac => MAC,
        KeyType::Kek => KEK,
    }
}

/// Diversification data for one key purpose, `None` for [`DiversificationScheme::None`]
pub fn diversification_data(
    scheme: DiversificationScheme,
    identity: &CardIdentity,
    key_type: KeyType,
) -> Option<[u8; 16]> {
    let t = type_byte(key_type);
    let mut data = [0u8; 16];
    match scheme {
        DiversificationScheme::Emv => {
            let kdd = identity.kdd();
            data[..6].copy_from_slice(&kdd[4..10]);
            data[6..8].copy_from_slice(&[LEFT, t]);
            data[8..14].copy_from_slice(&kdd[4..10]);
            data[14..].copy_from_slice(&[RIGHT, t]);
        }
        DiversificationScheme::Visa2 => {
            let cuid = identity.cuid();
            data[..2].copy_from_slice(&cuid[0..2]);
            data[2..6].copy_from_slice(&cuid[4..8]);
            data[6..8].copy_from_slice(&[LEFT, t]);
            data[8..10].copy_from_slice(&cuid[0..2]);
            data[10..14].copy_from_slice(&cuid[4..8]);
            data[14..].copy_from_slice(&[RIGHT, t]);
        }
        DiversificationScheme::None => return None,
    }
    Some(data)
}

/// Diversify a single master key over prepared data
pub fn diversify_key(master: &SymmetricKey, data: &[u8; 16]) -> Result<SymmetricKey> {
    let card_key = encrypt_ecb(master, data)?;
    SymmetricKey::new(master.algorithm(), &card_key)
}

/// Diversify master keys into the card keys of one card
pub fn diversify(
    master: &StaticKeys,
    identity: &CardIdentity,
    scheme: DiversificationScheme,
) -> Result<StaticKeys> {
    trace!(?scheme, algorithm = %master.algorithm(), "diversifying master keys");

    let derive = |key_type: KeyType| -> Result<SymmetricKey> {
        let key = master.get(key_type);
        match diversification_data(scheme, identity, key_type) {
            Some(data) => diversify_key(key, &data),
            None => Ok(key.clone()),
        }
    };

    StaticKeys::new(
        derive(KeyType::Enc)?,
        derive(KeyType::Mac)?,
        derive(KeyType::Kek)?,
    )
}

/// Card keys before and after a key change
#[derive(Debug, Clone)]
pub struct KeyRotation {
    /// Keys currently on the card
    pub old: StaticKeys,
    /// Keys to put on the card
    pub new: StaticKeys,
}

/// Derive the current and the replacement card keys of one card
///
/// Either both sets are derived or the rotation fails as a whole.
pub fn rotate(
    old_master: &StaticKeys,
    old_params: &ProtocolParameters,
    new_master: &StaticKeys,
    new_params: &ProtocolParameters,
    identity: &CardIdentity,
) -> Result<KeyRotation> {
    let old = derive_card_keys(old_master, identity, old_params)
        .inspect_err(|err| warn!(%err, "deriving current card keys failed"))?;
    let new = derive_card_keys(new_master, identity, new_params)
        .inspect_err(|err| warn!(%err, "deriving replacement card keys failed"))?;
    Ok(KeyRotation { old, new })
}
