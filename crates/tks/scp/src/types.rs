//! Protocol data types
//!
//! Fixed-size inputs exchanged while opening a secure channel. Each type
//! validates its length on construction so the derivation code can work
//! with plain arrays.

use std::fmt;

use crate::constants::{
    CHALLENGE_LENGTH, CUID_LENGTH, KDD_LENGTH, KEY_INFO_LENGTH, KEY_INFO_LENGTH_SCP03, scp,
};
use crate::keys::KeyAlgorithm;
use crate::util::to_array;
use crate::{Error, Result};

/// Host or card cryptogram
pub type Cryptogram = [u8; 8];

/// Secure Channel Protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    /// SCP01
    Scp01,
    /// SCP02
    Scp02,
    /// SCP03
    Scp03,
}

impl Protocol {
    /// Protocol version number
    pub const fn version(self) -> u8 {
        match self {
            Self::Scp01 => scp::SCP01,
            Self::Scp02 => scp::SCP02,
            Self::Scp03 => scp::SCP03,
        }
    }

    /// Expected key info length for this protocol
    pub const fn key_info_len(self) -> usize {
        match self {
            Self::Scp01 | Self::Scp02 => KEY_INFO_LENGTH,
            Self::Scp03 => KEY_INFO_LENGTH_SCP03,
        }
    }

    /// Algorithm of the static and session keys
    pub const fn key_algorithm(self) -> KeyAlgorithm {
        match self {
            Self::Scp01 | Self::Scp02 => KeyAlgorithm::Des3,
            Self::Scp03 => KeyAlgorithm::Aes,
        }
    }
}

impl TryFrom<u8> for Protocol {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            scp::SCP01 => Ok(Self::Scp01),
            scp::SCP02 => Ok(Self::Scp02),
            scp::SCP03 => Ok(Self::Scp03),
            other => Err(Error::UnsupportedProtocol(other)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SCP{:02}", self.version())
    }
}

/// Master key version
///
/// Versions are unsigned and compared ordinally over the full byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyVersion(pub u8);

impl KeyVersion {
    /// Raw version byte
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Whether this version is at or above a threshold
    pub const fn at_least(self, threshold: Self) -> bool {
        self.0 >= threshold.0
    }
}

impl From<u8> for KeyVersion {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Key version information identifying the static keys to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyInfo {
    /// Key version
    pub version: KeyVersion,
    /// Key index
    pub index: u8,
    /// SCP03 `i` parameter (third byte)
    pub protocol: Option<u8>,
}

impl KeyInfo {
    /// Parse key info bytes: two bytes, or three for SCP03
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        match *data {
            [version, index] => Ok(Self {
                version: KeyVersion(version),
                index,
                protocol: None,
            }),
            [version, index, protocol] => Ok(Self {
                version: KeyVersion(version),
                index,
                protocol: Some(protocol),
            }),
            _ => Err(Error::InvalidKeyInfo("key info must be 2 or 3 bytes")),
        }
    }

    /// Parse key info bytes and check their length against a protocol
    pub fn for_protocol(data: &[u8], protocol: Protocol) -> Result<Self> {
        if data.len() != protocol.key_info_len() {
            return Err(Error::InvalidKeyInfo(match protocol {
                Protocol::Scp03 => "SCP03 key info must be 3 bytes",
                Protocol::Scp01 | Protocol::Scp02 => "SCP01/SCP02 key info must be 2 bytes",
            }));
        }
        Self::from_bytes(data)
    }
}

/// Card identity used for diversification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CardIdentity {
    cuid: [u8; CUID_LENGTH],
    kdd: [u8; KDD_LENGTH],
}

impl CardIdentity {
    /// Create an identity; the KDD defaults to the CUID when absent
    pub fn new(cuid: &[u8], kdd: Option<&[u8]>) -> Result<Self> {
        let cuid = to_array("CUID", cuid)?;
        let kdd = match kdd {
            Some(kdd) if !kdd.is_empty() => to_array("KDD", kdd)?,
            _ => cuid,
        };
        Ok(Self { cuid, kdd })
    }

    /// Card unique identifier
    pub const fn cuid(&self) -> &[u8; CUID_LENGTH] {
        &self.cuid
    }

    /// Key derivation data
    pub const fn kdd(&self) -> &[u8; KDD_LENGTH] {
        &self.kdd
    }
}

/// Host and card challenges of one channel opening
///
/// For SCP02 the card field is the sequence counter followed by the six byte
/// card challenge, as returned by INITIALIZE UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Challenges {
    card: [u8; CHALLENGE_LENGTH],
    host: [u8; CHALLENGE_LENGTH],
}

impl Challenges {
    /// Create a challenge pair
    pub fn new(card: &[u8], host: &[u8]) -> Result<Self> {
        Ok(Self {
            card: to_array("card challenge", card)?,
            host: to_array("host challenge", host)?,
        })
    }

    /// Card challenge field
    pub const fn card(&self) -> &[u8; CHALLENGE_LENGTH] {
        &self.card
    }

    /// Host challenge
    pub const fn host(&self) -> &[u8; CHALLENGE_LENGTH] {
        &self.host
    }

    /// SCP02 sequence counter (first two bytes of the card field)
    pub fn sequence_counter(&self) -> [u8; 2] {
        [self.card[0], self.card[1]]
    }

    /// SCP02 six byte card challenge (after the sequence counter)
    pub fn scp02_card_challenge(&self) -> &[u8] {
        &self.card[2..]
    }

    /// SCP03 derivation context: host challenge followed by card challenge
    pub fn scp03_context(&self) -> [u8; 2 * CHALLENGE_LENGTH] {
        let mut context = [0u8; 2 * CHALLENGE_LENGTH];
        context[..CHALLENGE_LENGTH].copy_from_slice(&self.host);
        context[CHALLENGE_LENGTH..].copy_from_slice(&self.card);
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_key_info_lengths() {
        let info = KeyInfo::from_bytes(&hex!("0101")).unwrap();
        assert_eq!(info.version, KeyVersion(1));
        assert_eq!(info.protocol, None);

        let info = KeyInfo::from_bytes(&hex!("300170")).unwrap();
        assert_eq!(info.version, KeyVersion(0x30));
        assert_eq!(info.protocol, Some(0x70));
        assert_eq!(info.index, 0x01);

        assert!(KeyInfo::from_bytes(&hex!("01")).is_err());
        assert!(KeyInfo::from_bytes(&hex!("01020304")).is_err());

        assert!(KeyInfo::for_protocol(&hex!("0101"), Protocol::Scp02).is_ok());
        assert!(KeyInfo::for_protocol(&hex!("0101"), Protocol::Scp03).is_err());
        assert!(KeyInfo::for_protocol(&hex!("010170"), Protocol::Scp01).is_err());
    }

    #[test]
    fn test_key_version_is_unsigned() {
        assert!(KeyVersion(0x80).at_least(KeyVersion(0x7F)));
        assert!(KeyVersion(0xFF).at_least(KeyVersion(0x80)));
        assert!(!KeyVersion(0x7F).at_least(KeyVersion(0x80)));
        assert!(KeyVersion(0x00).at_least(KeyVersion(0x00)));
    }

    #[test]
    fn test_card_identity_defaults_kdd() {
        let cuid = hex!("0102030405060708090a");
        let identity = CardIdentity::new(&cuid, None).unwrap();
        assert_eq!(identity.kdd(), &cuid);

        let identity = CardIdentity::new(&cuid, Some(&[])).unwrap();
        assert_eq!(identity.kdd(), &cuid);

        let kdd = hex!("00000265018303953662");
        let identity = CardIdentity::new(&cuid, Some(&kdd)).unwrap();
        assert_eq!(identity.kdd(), &kdd);
        assert_eq!(identity.cuid(), &cuid);

        assert!(CardIdentity::new(&cuid[..9], None).is_err());
        assert!(CardIdentity::new(&cuid, Some(&kdd[..5])).is_err());
    }

    #[test]
    fn test_challenges() {
        let challenges =
            Challenges::new(&hex!("000de9c62ba1c4c8"), &hex!("f0467f908e5ca23f")).unwrap();
        assert_eq!(challenges.sequence_counter(), hex!("000d"));
        assert_eq!(challenges.scp02_card_challenge(), hex!("e9c62ba1c4c8"));
        assert_eq!(
            challenges.scp03_context(),
            hex!("f0467f908e5ca23f000de9c62ba1c4c8")
        );

        assert!(Challenges::new(&hex!("000de9c62ba1c4"), &hex!("f0467f908e5ca23f")).is_err());
        assert!(Challenges::new(&hex!("000de9c62ba1c4c8"), &hex!("f046")).is_err());
    }

    #[test]
    fn test_protocol_from_u8() {
        assert_eq!(Protocol::try_from(2).unwrap(), Protocol::Scp02);
        assert!(matches!(
            Protocol::try_from(4),
            Err(Error::UnsupportedProtocol(4))
        ));
        assert_eq!(Protocol::Scp03.to_string(), "SCP03");
        assert_eq!(Protocol::Scp01.key_algorithm(), KeyAlgorithm::Des3);
        assert_eq!(Protocol::Scp03.key_algorithm(), KeyAlgorithm::Aes);
    }
}
