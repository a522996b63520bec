//! Constants used by the secure channel protocols
//!
//! Byte values defined by the GlobalPlatform Card Specification (SCP01 and
//! SCP02 in v2.1.1, SCP03 in Amendment D) and by the key derivation schemes
//! the token key service supports.

/// Secure Channel Protocol (SCP) versions
pub mod scp {
    /// SCP01 protocol version
    pub const SCP01: u8 = 0x01;
    /// SCP02 protocol version
    pub const SCP02: u8 = 0x02;
    /// SCP03 protocol version
    pub const SCP03: u8 = 0x03;
}

/// SCP02 session key derivation constants
pub mod scp02 {
    /// Derivation constant for the C-MAC session key
    pub const C_MAC: [u8; 2] = [0x01, 0x01];
    /// Derivation constant for the R-MAC session key
    pub const R_MAC: [u8; 2] = [0x01, 0x02];
    /// Derivation constant for the DEK session key
    pub const DEK: [u8; 2] = [0x01, 0x81];
    /// Derivation constant for the S-ENC session key
    pub const S_ENC: [u8; 2] = [0x01, 0x82];
}

/// SCP03 data derivation constants
pub mod scp03 {
    /// Card cryptogram
    pub const CARD_CRYPTOGRAM: u8 = 0x00;
    /// Host cryptogram
    pub const HOST_CRYPTOGRAM: u8 = 0x01;
    /// S-ENC session key
    pub const S_ENC: u8 = 0x04;
    /// S-MAC session key
    pub const S_MAC: u8 = 0x06;
    /// S-RMAC session key
    pub const S_RMAC: u8 = 0x07;
    /// Length in bits of a cryptogram
    pub const CRYPTOGRAM_BITS: u16 = 64;
}

/// Key type bytes used in diversification data
pub mod diversification {
    /// Encryption (authentication) key
    pub const ENC: u8 = 0x01;
    /// MAC key
    pub const MAC: u8 = 0x02;
    /// Key encryption key
    pub const KEK: u8 = 0x03;
    /// Marker preceding the key type in the first half
    pub const LEFT: u8 = 0xF0;
    /// Marker preceding the key type in the second half
    pub const RIGHT: u8 = 0x0F;
}

/// NIST SP800-108 card key derivation parameters
pub mod nist_kdf {
    /// Label byte
    pub const LABEL: u8 = 0x04;
    /// Bytes of output: three 16-byte card keys
    pub const OUTPUT_LEN: usize = 48;
    /// Size of each derived card key
    pub const KEY_LEN: usize = 16;
}

/// PUT KEY key data encoding
pub mod put_key {
    /// DES key type
    pub const KEY_TYPE_DES: u8 = 0x80;
    /// AES key type
    pub const KEY_TYPE_AES: u8 = 0x88;
    /// Length of a key check value
    pub const KCV_LEN: usize = 3;
}

/// Length of a card unique identifier
pub const CUID_LENGTH: usize = 10;

/// Length of key derivation data
pub const KDD_LENGTH: usize = 10;

/// Length of a host or card challenge
pub const CHALLENGE_LENGTH: usize = 8;

/// Length of a host or card cryptogram
pub const CRYPTOGRAM_LENGTH: usize = 8;

/// Key info length for SCP01 and SCP02
pub const KEY_INFO_LENGTH: usize = 2;

/// Key info length for SCP03
pub const KEY_INFO_LENGTH_SCP03: usize = 3;

/// Largest amount of random data a single request may ask for
pub const MAX_RANDOM_DATA_LENGTH: usize = 2048;

/// Key version under which developer keys are registered
pub const DEVELOPER_KEY_VERSION: u8 = 0x01;
