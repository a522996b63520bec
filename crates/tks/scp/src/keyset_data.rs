//! Key set data for PUT KEY
//!
//! Encodes the replacement card keys of a key rotation, each encrypted under
//! the wrapping key of the current channel and followed by its check value.

use tracing::debug;

use crate::constants::put_key::{KCV_LEN, KEY_TYPE_AES, KEY_TYPE_DES};
use crate::keys::{KeyType, StaticKeys, SymmetricKey};
use crate::session::{DerivationConstant, scp02_session_key};
use crate::types::{KeyVersion, Protocol};
use crate::wrap::{compute_key_check_value, wrap_under_key};
use crate::{Error, Result};

/// Length of every provisioned card key
const CARD_KEY_LEN: usize = 16;

/// Key used to encrypt the new keys
///
/// SCP02 encrypts under the DEK session key derived from the current card
/// KEK and the sequence counter; SCP01 and SCP03 use the current card KEK.
pub fn wrapping_key(
    old_card_keys: &StaticKeys,
    protocol: Protocol,
    sequence_counter: Option<&[u8; 2]>,
) -> Result<SymmetricKey> {
    match protocol {
        Protocol::Scp01 | Protocol::Scp03 => Ok(old_card_keys.kek().clone()),
        Protocol::Scp02 => {
            let counter = sequence_counter.ok_or(Error::MissingParameter("sequence counter"))?;
            scp02_session_key(old_card_keys.kek(), DerivationConstant::Dek, counter)
        }
    }
}

/// Build the key set data for a PUT KEY command
pub fn create_key_set_data(
    new_version: KeyVersion,
    new_keys: &StaticKeys,
    wrapping_key: &SymmetricKey,
    protocol: Protocol,
) -> Result<Vec<u8>> {
    let expected = protocol.key_algorithm();
    if new_keys.algorithm() != expected || wrapping_key.algorithm() != expected {
        return Err(Error::InvalidParameter {
            name: "key set data",
            reason: format!("{protocol} requires {expected} keys"),
        });
    }

    let mut out = Vec::with_capacity(1 + 3 * (4 + CARD_KEY_LEN + KCV_LEN));
    out.push(new_version.value());
    for key_type in KeyType::ALL {
        let key = new_keys.get(key_type);
        if key.len() != CARD_KEY_LEN {
            return Err(Error::InvalidLength {
                field: "card key",
                expected: CARD_KEY_LEN,
                actual: key.len(),
            });
        }
        let encrypted = wrap_under_key(wrapping_key, key)?;
        let kcv = compute_key_check_value(key)?;

        match protocol {
            Protocol::Scp01 | Protocol::Scp02 => {
                out.extend_from_slice(&[KEY_TYPE_DES, CARD_KEY_LEN as u8]);
            }
            Protocol::Scp03 => {
                out.extend_from_slice(&[
                    KEY_TYPE_AES,
                    CARD_KEY_LEN as u8 + 1,
                    CARD_KEY_LEN as u8,
                ]);
            }
        }
        out.extend_from_slice(encrypted.as_bytes());
        out.push(KCV_LEN as u8);
        out.extend_from_slice(&kcv);
    }

    debug!(%protocol, version = %new_version, len = out.len(), "built key set data");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const OLD: [u8; 16] = hex!("404142434445464748494a4b4c4d4e4f");

    fn new_des_keys() -> StaticKeys {
        StaticKeys::new(
            SymmetricKey::des3(&hex!("91b57590fd362c4146e9936d97794396")).unwrap(),
            SymmetricKey::des3(&hex!("57759e1f46e69758343201072e62a4d3")).unwrap(),
            SymmetricKey::des3(&hex!("5b57bcac709ec5c5ad5a48b9654c0ab1")).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_scp01_key_set_data() {
        let old = StaticKeys::from_single_key(SymmetricKey::des3(&OLD).unwrap());
        let kek = wrapping_key(&old, Protocol::Scp01, None).unwrap();
        let data = create_key_set_data(KeyVersion(2), &new_des_keys(), &kek, Protocol::Scp01)
            .unwrap();
        assert_eq!(
            data,
            hex!(
                "02"
                "80104f7a34701c72ab0fa948f2c48ad901d60302fe98"
                "8010e8fd4e4c25f793593d3588e5145effbd03e0cf00"
                "8010ef8e0506691ffebd5ef2acd37bec816103b0e95f"
            )
        );
    }

    #[test]
    fn test_scp02_key_set_data() {
        let old = StaticKeys::from_single_key(SymmetricKey::des3(&OLD).unwrap());
        let kek = wrapping_key(&old, Protocol::Scp02, Some(&hex!("000d"))).unwrap();
        assert_eq!(kek.as_bytes(), hex!("bff2832f9ab9db03ad37b4e7e141c507"));

        let data = create_key_set_data(KeyVersion(2), &new_des_keys(), &kek, Protocol::Scp02)
            .unwrap();
        assert_eq!(
            data,
            hex!(
                "02"
                "80106a39bc5a79f864591175160daa258c3b0302fe98"
                "801025b548499ab74a2312a59c8ae2cc295e03e0cf00"
                "801028ddc681b6d0b6f69d0ec2493b80fcd003b0e95f"
            )
        );

        assert!(matches!(
            wrapping_key(&old, Protocol::Scp02, None),
            Err(Error::MissingParameter(_))
        ));
    }

    #[test]
    fn test_scp03_key_set_data() {
        let old = StaticKeys::from_single_key(SymmetricKey::aes(&OLD).unwrap());
        let new = StaticKeys::new(
            SymmetricKey::aes(&hex!("f9ace8d1ca66df10d10a862324c01129")).unwrap(),
            SymmetricKey::aes(&hex!("6eae21fbe89c9104f4b9e46cf599beaf")).unwrap(),
            SymmetricKey::aes(&hex!("46cb7bbe16f7dd1215b9c200acde4321")).unwrap(),
        )
        .unwrap();
        let kek = wrapping_key(&old, Protocol::Scp03, None).unwrap();
        let data = create_key_set_data(KeyVersion(0x30), &new, &kek, Protocol::Scp03).unwrap();
        assert_eq!(
            data,
            hex!(
                "30"
                "881110" "2da2beb333f9f820bd86186100bf59c0" "03795105"
                "881110" "e09bd7957ff87bb0bc48ea87b1b00879" "037f8b89"
                "881110" "33acee11c90996f0eaf38c5b4c2761e0" "0320eb44"
            )
        );
    }

    #[test]
    fn test_algorithm_mismatch() {
        let kek = SymmetricKey::des3(&OLD).unwrap();
        let err =
            create_key_set_data(KeyVersion(2), &new_des_keys(), &kek, Protocol::Scp03).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }
}
