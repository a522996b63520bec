//! Block cipher primitives for the secure channel protocols
//!
//! This module provides the DES3 and AES building blocks shared by key
//! diversification, session key derivation and cryptogram calculation:
//! ECB encryption, the SCP02 CBC derivation, the full 3DES MAC, AES-CMAC
//! and HMAC-SHA256.

use aes::{Aes128, Aes192, Aes256};
use cbc_mac::{CbcMac, Mac};
use cipher::{
    Block, BlockCipher, BlockDecrypt, BlockEncrypt, BlockEncryptMut, Key, KeyInit, KeyIvInit,
    block_padding::{Iso7816, Padding},
    generic_array::GenericArray,
};
use cmac::Cmac;
use des::TdesEde3;
use hmac::Hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::keys::{KeyAlgorithm, SymmetricKey};
use crate::util::to_array;
use crate::{Error, Result};

/// Eight byte MAC
pub type Mac8 = [u8; 8];

/// Resize a DES3 key to 24 bytes for three-key 3DES
///
/// A 16-byte key has its first 8 bytes copied to the end; a 24-byte key is
/// used unchanged.
pub fn resize_key(key: &[u8]) -> Result<Zeroizing<Key<TdesEde3>>> {
    let mut result = Zeroizing::new(Key::<TdesEde3>::default());
    match key.len() {
        16 => {
            result[..16].copy_from_slice(key);
            result[16..24].copy_from_slice(&key[..8]);
        }
        24 => result.copy_from_slice(key),
        actual => {
            return Err(Error::InvalidLength {
                field: "DES3 key",
                expected: 16,
                actual,
            });
        }
    }
    Ok(result)
}

fn check_blocks(data: &[u8], block_size: usize) -> Result<()> {
    if data.is_empty() || data.len() % block_size != 0 {
        return Err(Error::Crypto("data is not a whole number of cipher blocks"));
    }
    Ok(())
}

fn ecb_encrypt_in_place<C: BlockEncrypt>(cipher: &C, data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(C::block_size()) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
}

fn ecb_decrypt_in_place<C: BlockDecrypt>(cipher: &C, data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(C::block_size()) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
}

fn aes_cipher<C: BlockCipher + KeyInit>(key: &[u8]) -> Result<C> {
    C::new_from_slice(key).map_err(|_| Error::Crypto("invalid AES key length"))
}

/// Encrypt whole blocks in ECB mode under a key
pub fn encrypt_ecb(key: &SymmetricKey, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    check_blocks(data, key.algorithm().block_size())?;
    let mut out = Zeroizing::new(data.to_vec());
    match (key.algorithm(), key.len()) {
        (KeyAlgorithm::Des3, _) => {
            let cipher = TdesEde3::new(&*resize_key(key.as_bytes())?);
            ecb_encrypt_in_place(&cipher, &mut out);
        }
        (KeyAlgorithm::Aes, 16) => {
            ecb_encrypt_in_place(&aes_cipher::<Aes128>(key.as_bytes())?, &mut out)
        }
        (KeyAlgorithm::Aes, 24) => {
            ecb_encrypt_in_place(&aes_cipher::<Aes192>(key.as_bytes())?, &mut out)
        }
        (KeyAlgorithm::Aes, _) => {
            ecb_encrypt_in_place(&aes_cipher::<Aes256>(key.as_bytes())?, &mut out)
        }
    }
    Ok(out)
}

/// Decrypt whole blocks in ECB mode under a key
pub fn decrypt_ecb(key: &SymmetricKey, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    check_blocks(data, key.algorithm().block_size())?;
    let mut out = Zeroizing::new(data.to_vec());
    match (key.algorithm(), key.len()) {
        (KeyAlgorithm::Des3, _) => {
            let cipher = TdesEde3::new(&*resize_key(key.as_bytes())?);
            ecb_decrypt_in_place(&cipher, &mut out);
        }
        (KeyAlgorithm::Aes, 16) => {
            ecb_decrypt_in_place(&aes_cipher::<Aes128>(key.as_bytes())?, &mut out)
        }
        (KeyAlgorithm::Aes, 24) => {
            ecb_decrypt_in_place(&aes_cipher::<Aes192>(key.as_bytes())?, &mut out)
        }
        (KeyAlgorithm::Aes, _) => {
            ecb_decrypt_in_place(&aes_cipher::<Aes256>(key.as_bytes())?, &mut out)
        }
    }
    Ok(out)
}

/// Encrypt whole blocks with 3DES in CBC mode and a zero IV
///
/// This is the SCP02 session key derivation primitive.
///
/// # Arguments
///
/// * `key` - The DES3 key (16 or 24 bytes)
/// * `data` - The data to encrypt, a multiple of 8 bytes
///
/// # Returns
///
/// The ciphertext, as long as `data`
pub fn encrypt_cbc_des3(key: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    check_blocks(data, 8)?;
    let mut out = Zeroizing::new(data.to_vec());
    let key = resize_key(key)?;
    let iv = GenericArray::default();
    let mut encryptor = cbc::Encryptor::<TdesEde3>::new(&key, &iv);
    for chunk in out.chunks_exact_mut(8) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    Ok(out)
}

/// Calculate a full 3DES MAC with ISO 9797-1 padding method 2 and a zero IV
///
/// This is the SCP01/SCP02 cryptogram primitive: the data is padded with
/// `80 00..`, encrypted with 3DES in CBC mode and the last block returned.
///
/// # Arguments
///
/// * `key` - The DES3 key (16 or 24 bytes)
/// * `data` - The data to MAC, of any length
///
/// # Returns
///
/// The MAC (8 bytes)
pub fn mac_des3(key: &[u8], data: &[u8]) -> Result<Mac8> {
    let key = resize_key(key)?;
    let mut mac = <CbcMac<TdesEde3> as KeyInit>::new(&key);

    let full = data.len() - data.len() % 8;
    Mac::update(&mut mac, &data[..full]);

    let remainder = &data[full..];
    let mut last = Block::<TdesEde3>::default();
    last[..remainder.len()].copy_from_slice(remainder);
    Iso7816::pad(&mut last, remainder.len());
    Mac::update(&mut mac, &last);

    Ok(mac.finalize().into_bytes().into())
}

/// Calculate AES-CMAC over data
pub fn aes_cmac(key: &SymmetricKey, data: &[u8]) -> Result<[u8; 16]> {
    fn run<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<[u8; 16]> {
        let mut mac =
            <M as Mac>::new_from_slice(key).map_err(|_| Error::Crypto("invalid CMAC key length"))?;
        Mac::update(&mut mac, data);
        to_array("CMAC", &mac.finalize().into_bytes())
    }

    if key.algorithm() != KeyAlgorithm::Aes {
        return Err(Error::Crypto("CMAC requires an AES key"));
    }
    match key.len() {
        16 => run::<Cmac<Aes128>>(key.as_bytes(), data),
        24 => run::<Cmac<Aes192>>(key.as_bytes(), data),
        _ => run::<Cmac<Aes256>>(key.as_bytes(), data),
    }
}

/// Calculate HMAC-SHA256 over the concatenation of `parts`
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 32]> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|_| Error::Crypto("invalid HMAC key"))?;
    for part in parts {
        Mac::update(&mut mac, part);
    }
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const GP_KEY: [u8; 16] = hex!("404142434445464748494a4b4c4d4e4f");

    #[test]
    fn test_resize_key_24() {
        let resized = resize_key(&GP_KEY).unwrap();
        assert_eq!(
            resized.as_slice(),
            hex!("404142434445464748494a4b4c4d4e4f4041424344454647")
        );
        assert!(resize_key(&GP_KEY[..8]).is_err());
    }

    #[test]
    fn test_encrypt_cbc_des3_scp02_enc() {
        let mut data = [0u8; 16];
        data[..4].copy_from_slice(&hex!("01820065"));
        let key = encrypt_cbc_des3(&GP_KEY, &data).unwrap();
        assert_eq!(key.as_slice(), hex!("85e72aaf47874218a202bf5ef891dd21"));
    }

    #[test]
    fn test_mac_des3_card_cryptogram() {
        let enc_key = hex!("16b5867ff50be7239c2bf1245b83a362");
        let data = hex!("32da078d7aac1cff 0072 84f64a7d6465");
        assert_eq!(mac_des3(&enc_key, &data).unwrap(), hex!("05c4bb8a86014e22"));
    }

    #[test]
    fn test_ecb_round_trip_and_kcv() {
        let key = SymmetricKey::des3(&GP_KEY).unwrap();
        let encrypted = encrypt_ecb(&key, &[0u8; 8]).unwrap();
        assert_eq!(&encrypted[..3], hex!("8baf47"));
        let decrypted = decrypt_ecb(&key, &encrypted).unwrap();
        assert_eq!(decrypted.as_slice(), [0u8; 8]);
    }

    #[test]
    fn test_ecb_rejects_partial_blocks() {
        let key = SymmetricKey::aes(&GP_KEY).unwrap();
        assert!(encrypt_ecb(&key, &[0u8; 8]).is_err());
        assert!(encrypt_ecb(&key, &[]).is_err());
    }

    #[test]
    fn test_aes_cmac_rejects_des_key() {
        let key = SymmetricKey::des3(&GP_KEY).unwrap();
        assert!(aes_cmac(&key, b"data").is_err());
    }
}
