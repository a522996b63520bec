//! Card key derivation functions
//!
//! A key set derives card keys either with the legacy diversification
//! layouts or with a NIST SP800-108 counter mode KDF, selected per key
//! version by the resolver. The SCP03 data derivation function also lives
//! here since session keys and cryptograms share it.

use tracing::debug;
use zeroize::Zeroizing;

use crate::constants::nist_kdf;
use crate::crypto::{aes_cmac, hmac_sha256};
use crate::diversify::diversify;
use crate::keys::{KeyType, StaticKeys, SymmetricKey};
use crate::resolver::ProtocolParameters;
use crate::types::CardIdentity;
use crate::{Error, Result};

/// Key derivation scheme used for a key version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfScheme {
    /// EMV / Visa2 diversification of the master keys
    Legacy,
    /// NIST SP800-108 counter mode with HMAC-SHA256
    NistSp800_108,
}

/// NIST SP800-108 KDF in counter mode with HMAC-SHA256 as the PRF
///
/// Block `i` (one byte, starting at 1) is
/// `HMAC(key, i || label || 00 || context || L)` where `L` is the output
/// length in bits as two big-endian bytes.
///
/// # Arguments
///
/// * `key` - The master key bytes
/// * `label` - The label byte
/// * `context` - The derivation context (CUID or KDD)
/// * `out_len` - The output length in bytes
///
/// # Returns
///
/// `out_len` bytes of key material
pub fn nist_sp800_108_hmac_sha256(
    key: &[u8],
    label: u8,
    context: &[u8],
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    const PRF_LEN: usize = 32;

    let bits = out_len
        .checked_mul(8)
        .and_then(|bits| u16::try_from(bits).ok())
        .filter(|bits| *bits > 0)
        .ok_or(Error::Crypto("unsupported KDF output length"))?;
    let blocks = u8::try_from(out_len.div_ceil(PRF_LEN))
        .map_err(|_| Error::Crypto("unsupported KDF output length"))?;

    let mut out = Zeroizing::new(Vec::with_capacity(usize::from(blocks) * PRF_LEN));
    for counter in 1..=blocks {
        let block = Zeroizing::new(hmac_sha256(
            key,
            &[&[counter, label, 0x00], context, &bits.to_be_bytes()],
        )?);
        out.extend_from_slice(block.as_ref());
    }
    out.truncate(out_len);
    Ok(out)
}

/// SCP03 data derivation function (NIST SP800-108 counter mode, AES-CMAC)
///
/// Block `i` is `CMAC(key, 00*11 || constant || 00 || L || i || context)`
/// with `L` the output length in bits.
///
/// # Arguments
///
/// * `key` - The AES key
/// * `constant` - The derivation constant
/// * `context` - The context (host challenge followed by card challenge)
/// * `out_bits` - The output length in bits, a multiple of 8
///
/// # Returns
///
/// The derived bytes (`out_bits / 8`)
pub fn scp03_cmac_kdf(
    key: &SymmetricKey,
    constant: u8,
    context: &[u8],
    out_bits: u16,
) -> Result<Zeroizing<Vec<u8>>> {
    const PRF_LEN: usize = 16;

    if out_bits == 0 || out_bits % 8 != 0 {
        return Err(Error::Crypto("unsupported KDF output length"));
    }
    let out_len = usize::from(out_bits / 8);
    let blocks = u8::try_from(out_len.div_ceil(PRF_LEN))
        .map_err(|_| Error::Crypto("unsupported KDF output length"))?;

    let mut input = Vec::with_capacity(16 + context.len());
    input.extend_from_slice(&[0u8; 11]);
    input.push(constant);
    input.push(0x00);
    input.extend_from_slice(&out_bits.to_be_bytes());
    let counter_pos = input.len();
    input.push(0x00);
    input.extend_from_slice(context);

    let mut out = Zeroizing::new(Vec::with_capacity(usize::from(blocks) * PRF_LEN));
    for counter in 1..=blocks {
        input[counter_pos] = counter;
        let block = Zeroizing::new(aes_cmac(key, &input)?);
        out.extend_from_slice(block.as_ref());
    }
    out.truncate(out_len);
    Ok(out)
}

/// Derive the card keys of one card from master keys
///
/// The master keys must use the algorithm of the resolved protocol.
pub fn derive_card_keys(
    master: &StaticKeys,
    identity: &CardIdentity,
    params: &ProtocolParameters,
) -> Result<StaticKeys> {
    let expected = params.protocol.key_algorithm();
    if master.algorithm() != expected {
        return Err(Error::InvalidParameter {
            name: "master keys",
            reason: format!("{} requires {expected} keys", params.protocol),
        });
    }
    debug!(
        kdf = ?params.kdf,
        version = %params.key_info.version,
        "deriving card keys"
    );
    match params.kdf {
        KdfScheme::Legacy => diversify(master, identity, params.diversification),
        KdfScheme::NistSp800_108 => nist_card_keys(master, params.kdf_context(identity)),
    }
}

/// NIST SP800-108 card keys
///
/// One 48 byte run per master key; each purpose takes its slice
/// (ENC `[0..16]`, MAC `[16..32]`, KEK `[32..48]`) from the run keyed by the
/// master key of the same purpose.
pub fn nist_card_keys(master: &StaticKeys, context: &[u8]) -> Result<StaticKeys> {
    let derive = |key_type: KeyType, slot: usize| -> Result<SymmetricKey> {
        let master_key = master.get(key_type);
        let output = nist_sp800_108_hmac_sha256(
            master_key.as_bytes(),
            nist_kdf::LABEL,
            context,
            nist_kdf::OUTPUT_LEN,
        )?;
        let start = slot * nist_kdf::KEY_LEN;
        SymmetricKey::new(
            master_key.algorithm(),
            &output[start..start + nist_kdf::KEY_LEN],
        )
    };

    StaticKeys::new(
        derive(KeyType::Enc, 0)?,
        derive(KeyType::Mac, 1)?,
        derive(KeyType::Kek, 2)?,
    )
}
