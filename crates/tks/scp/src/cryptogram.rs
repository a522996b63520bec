//! Host and card cryptograms

use tracing::warn;

use crate::constants::{CRYPTOGRAM_LENGTH, scp03};
use crate::crypto::mac_des3;
use crate::kdf::scp03_cmac_kdf;
use crate::keys::SymmetricKey;
use crate::types::{Challenges, Cryptogram, Protocol};
use crate::util::{constant_time_eq, to_array};
use crate::{Error, Result};

/// Which side of the channel a cryptogram authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Host cryptogram, sent to the card in EXTERNAL AUTHENTICATE
    Host,
    /// Card cryptogram, returned by INITIALIZE UPDATE
    Card,
}

/// Compute a cryptogram
///
/// `key` is the session key returned by
/// [`SessionKeys::cryptogram_key`](crate::session::SessionKeys::cryptogram_key):
/// S-ENC for SCP01/SCP02, S-MAC for SCP03.
pub fn compute_cryptogram(
    key: &SymmetricKey,
    challenges: &Challenges,
    role: Role,
    protocol: Protocol,
) -> Result<Cryptogram> {
    match protocol {
        // The SCP02 card field already starts with the sequence counter
        Protocol::Scp01 | Protocol::Scp02 => {
            let (first, second) = match role {
                Role::Card => (challenges.host(), challenges.card()),
                Role::Host => (challenges.card(), challenges.host()),
            };
            let mut data = [0u8; 16];
            data[..8].copy_from_slice(first);
            data[8..].copy_from_slice(second);
            mac_des3(key.as_bytes(), &data)
        }
        Protocol::Scp03 => {
            let constant = match role {
                Role::Card => scp03::CARD_CRYPTOGRAM,
                Role::Host => scp03::HOST_CRYPTOGRAM,
            };
            let out = scp03_cmac_kdf(
                key,
                constant,
                &challenges.scp03_context(),
                scp03::CRYPTOGRAM_BITS,
            )?;
            to_array("cryptogram", &out)
        }
    }
}

/// Compare an expected cryptogram with a computed one
///
/// Runs in constant time for equal lengths; different lengths never match.
pub fn verify(expected: &[u8], computed: &[u8]) -> bool {
    constant_time_eq(expected, computed)
}

/// Verify the cryptogram returned by the card
pub fn verify_card_cryptogram(
    key: &SymmetricKey,
    challenges: &Challenges,
    protocol: Protocol,
    card_cryptogram: &[u8],
) -> Result<()> {
    let computed = compute_cryptogram(key, challenges, Role::Card, protocol)?;
    if verify(card_cryptogram, &computed) {
        Ok(())
    } else {
        warn!(
            %protocol,
            length = card_cryptogram.len(),
            expected_length = CRYPTOGRAM_LENGTH,
            "card cryptogram mismatch"
        );
        Err(Error::CardCryptogramMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticKeys;
    use crate::session::compute_session_keys;
    use crate::types::KeyInfo;
    use hex_literal::hex;

    const KEY: [u8; 16] = hex!("404142434445464748494a4b4c4d4e4f");

    #[test]
    fn test_scp02_real_card_exchange() {
        let card_keys = StaticKeys::from_single_key(SymmetricKey::des3(&KEY).unwrap());
        let challenges =
            Challenges::new(&hex!("000de9c62ba1c4c8"), &hex!("f0467f908e5ca23f")).unwrap();
        let key_info = KeyInfo::from_bytes(&hex!("0101")).unwrap();
        let keys =
            compute_session_keys(&card_keys, &challenges, &key_info, Protocol::Scp02, false)
                .unwrap();
        let key = keys.cryptogram_key(Protocol::Scp02);

        let card = compute_cryptogram(key, &challenges, Role::Card, Protocol::Scp02).unwrap();
        assert_eq!(card, hex!("e55fcb91b6654ce4"));
        let host = compute_cryptogram(key, &challenges, Role::Host, Protocol::Scp02).unwrap();
        assert_eq!(host, hex!("3ce060483aace927"));

        assert!(verify_card_cryptogram(key, &challenges, Protocol::Scp02, &card).is_ok());
    }

    #[test]
    fn test_scp01_cryptograms() {
        let card_keys = StaticKeys::from_single_key(SymmetricKey::des3(&KEY).unwrap());
        let challenges =
            Challenges::new(&hex!("1122334455667788"), &hex!("0102030405060708")).unwrap();
        let key_info = KeyInfo::from_bytes(&hex!("0101")).unwrap();
        let keys =
            compute_session_keys(&card_keys, &challenges, &key_info, Protocol::Scp01, false)
                .unwrap();
        let key = keys.cryptogram_key(Protocol::Scp01);

        let card = compute_cryptogram(key, &challenges, Role::Card, Protocol::Scp01).unwrap();
        assert_eq!(card, hex!("1acffd8a33dc7004"));
        let host = compute_cryptogram(key, &challenges, Role::Host, Protocol::Scp01).unwrap();
        assert_eq!(host, hex!("05757f5b4d19d6c4"));
    }

    #[test]
    fn test_scp03_cryptograms() {
        let card_keys = StaticKeys::from_single_key(SymmetricKey::aes(&KEY).unwrap());
        let challenges =
            Challenges::new(&hex!("a1a2a3a4a5a6a7a8"), &hex!("b1b2b3b4b5b6b7b8")).unwrap();
        let key_info = KeyInfo::from_bytes(&hex!("300170")).unwrap();
        let keys =
            compute_session_keys(&card_keys, &challenges, &key_info, Protocol::Scp03, false)
                .unwrap();
        let key = keys.cryptogram_key(Protocol::Scp03);

        let card = compute_cryptogram(key, &challenges, Role::Card, Protocol::Scp03).unwrap();
        assert_eq!(card, hex!("8aa9dc9c40c2bd1e"));
        let host = compute_cryptogram(key, &challenges, Role::Host, Protocol::Scp03).unwrap();
        assert_eq!(host, hex!("c3174e146cfe1cb3"));
    }

    #[test]
    fn test_verify() {
        let computed = hex!("e55fcb91b6654ce4");
        assert!(verify(&computed, &computed));
        assert!(!verify(&hex!("e55fcb91b6654ce5"), &computed));
        assert!(!verify(&hex!("e55fcb91b6654c"), &computed));
        assert!(!verify(&[], &computed));
    }

    #[test]
    fn test_mismatch_is_verification_error() {
        let key = SymmetricKey::des3(&KEY).unwrap();
        let challenges = Challenges::new(&[1u8; 8], &[2u8; 8]).unwrap();
        let err =
            verify_card_cryptogram(&key, &challenges, Protocol::Scp01, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, Error::CardCryptogramMismatch));
        assert_eq!(err.status().code(), 3);
    }
}
