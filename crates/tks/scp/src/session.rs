//! Session key computation
//!
//! Session keys are derived from the card keys and the challenges of one
//! channel opening. SCP01 and SCP02 derive one key per call, selected by a
//! derivation constant; SCP03 derives the whole set in one call.

use tracing::trace;

use crate::constants::{scp02, scp03};
use crate::crypto::{encrypt_cbc_des3, encrypt_ecb};
use crate::kdf::scp03_cmac_kdf;
use crate::keys::{KeyAlgorithm, KeyType, StaticKeys, SymmetricKey};
use crate::types::{Challenges, KeyInfo, Protocol};
use crate::{Error, Result};

/// Purpose of a session key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationConstant {
    /// Command MAC key
    CMac,
    /// Response MAC key
    RMac,
    /// Session encryption key
    SEnc,
    /// Data encryption key
    Dek,
}

impl DerivationConstant {
    /// Parse the two byte SCP02 constant
    pub fn from_scp02_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            b if b == scp02::C_MAC => Ok(Self::CMac),
            b if b == scp02::R_MAC => Ok(Self::RMac),
            b if b == scp02::S_ENC => Ok(Self::SEnc),
            b if b == scp02::DEK => Ok(Self::Dek),
            _ => Err(Error::InvalidParameter {
                name: "derivation constant",
                reason: format!("unknown SCP02 constant {}", hex::encode(bytes)),
            }),
        }
    }

    /// SCP02 constant bytes
    pub const fn scp02_bytes(self) -> [u8; 2] {
        match self {
            Self::CMac => scp02::C_MAC,
            Self::RMac => scp02::R_MAC,
            Self::SEnc => scp02::S_ENC,
            Self::Dek => scp02::DEK,
        }
    }

    /// SCP03 derivation constant; the SCP03 DEK is not derived
    pub const fn scp03_byte(self) -> Option<u8> {
        match self {
            Self::CMac => Some(scp03::S_MAC),
            Self::RMac => Some(scp03::S_RMAC),
            Self::SEnc => Some(scp03::S_ENC),
            Self::Dek => None,
        }
    }

    /// Static card key the session key is derived from
    pub const fn static_key(self) -> KeyType {
        match self {
            Self::CMac | Self::RMac => KeyType::Mac,
            Self::SEnc => KeyType::Enc,
            Self::Dek => KeyType::Kek,
        }
    }
}

/// Session keys of one secure channel
#[derive(Debug, Clone)]
pub struct SessionKeys {
    enc: SymmetricKey,
    mac: SymmetricKey,
    kek: SymmetricKey,
    rmac: Option<SymmetricKey>,
}

impl SessionKeys {
    /// Session encryption key
    pub const fn enc(&self) -> &SymmetricKey {
        &self.enc
    }

    /// Command MAC key
    pub const fn mac(&self) -> &SymmetricKey {
        &self.mac
    }

    /// Data encryption key
    pub const fn kek(&self) -> &SymmetricKey {
        &self.kek
    }

    /// Response MAC key, when requested
    pub const fn rmac(&self) -> Option<&SymmetricKey> {
        self.rmac.as_ref()
    }

    /// Key the host and card cryptograms are computed with
    pub const fn cryptogram_key(&self, protocol: Protocol) -> &SymmetricKey {
        match protocol {
            Protocol::Scp01 | Protocol::Scp02 => &self.enc,
            Protocol::Scp03 => &self.mac,
        }
    }
}

fn check_protocol(card_keys: &StaticKeys, key_info: &KeyInfo, protocol: Protocol) -> Result<()> {
    if key_info.protocol.is_some() != (protocol == Protocol::Scp03) {
        return Err(Error::InvalidKeyInfo("key info does not match the protocol"));
    }
    let expected = protocol.key_algorithm();
    if card_keys.algorithm() != expected {
        return Err(Error::InvalidParameter {
            name: "card keys",
            reason: format!("{protocol} requires {expected} keys"),
        });
    }
    Ok(())
}

/// Derive an SCP02 session key from one static key and the sequence counter
pub fn scp02_session_key(
    static_key: &SymmetricKey,
    constant: DerivationConstant,
    sequence_counter: &[u8; 2],
) -> Result<SymmetricKey> {
    if static_key.algorithm() != KeyAlgorithm::Des3 {
        return Err(Error::InvalidParameter {
            name: "card keys",
            reason: format!("{} requires {} keys", Protocol::Scp02, KeyAlgorithm::Des3),
        });
    }
    let mut data = [0u8; 16];
    data[..2].copy_from_slice(&constant.scp02_bytes());
    data[2..4].copy_from_slice(sequence_counter);
    let key = encrypt_cbc_des3(static_key.as_bytes(), &data)?;
    SymmetricKey::des3(&key)
}

/// Compute one session key
pub fn compute_session_key(
    card_keys: &StaticKeys,
    challenges: &Challenges,
    key_info: &KeyInfo,
    constant: DerivationConstant,
    protocol: Protocol,
) -> Result<SymmetricKey> {
    check_protocol(card_keys, key_info, protocol)?;
    trace!(%protocol, ?constant, "computing session key");

    if protocol == Protocol::Scp01 && constant == DerivationConstant::RMac {
        return Err(Error::InvalidParameter {
            name: "derivation constant",
            reason: "SCP01 has no response MAC key".into(),
        });
    }

    let static_key = card_keys.get(constant.static_key());
    match protocol {
        Protocol::Scp01 => {
            if constant == DerivationConstant::Dek {
                return Ok(static_key.clone());
            }
            let card = challenges.card();
            let host = challenges.host();
            let mut data = [0u8; 16];
            data[..4].copy_from_slice(&card[4..8]);
            data[4..8].copy_from_slice(&host[..4]);
            data[8..12].copy_from_slice(&card[..4]);
            data[12..].copy_from_slice(&host[4..8]);
            let key = encrypt_ecb(static_key, &data)?;
            SymmetricKey::des3(&key)
        }
        Protocol::Scp02 => {
            scp02_session_key(static_key, constant, &challenges.sequence_counter())
        }
        Protocol::Scp03 => match constant.scp03_byte() {
            None => Ok(static_key.clone()),
            Some(byte) => {
                let bits = u16::try_from(static_key.len() * 8)
                    .map_err(|_| Error::Crypto("unsupported AES key length"))?;
                let key = scp03_cmac_kdf(static_key, byte, &challenges.scp03_context(), bits)?;
                SymmetricKey::aes(&key)
            }
        },
    }
}

/// Compute the session keys of a channel
///
/// The response MAC key is derived only when `with_rmac` is set; SCP01
/// has none and rejects the request.
pub fn compute_session_keys(
    card_keys: &StaticKeys,
    challenges: &Challenges,
    key_info: &KeyInfo,
    protocol: Protocol,
    with_rmac: bool,
) -> Result<SessionKeys> {
    let derive =
        |constant| compute_session_key(card_keys, challenges, key_info, constant, protocol);

    Ok(SessionKeys {
        enc: derive(DerivationConstant::SEnc)?,
        mac: derive(DerivationConstant::CMac)?,
        kek: derive(DerivationConstant::Dek)?,
        rmac: with_rmac
            .then(|| derive(DerivationConstant::RMac))
            .transpose()?,
    })
}
