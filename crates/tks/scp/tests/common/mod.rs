//! Common test fixtures

#![allow(dead_code)]

use hex_literal::hex;
use tks_scp::{SoftToken, TksConfig, TokenKeyService};

/// GlobalPlatform default test key
pub const GP_KEY: [u8; 16] = hex!("404142434445464748494a4b4c4d4e4f");

/// Replacement master key used for rotation tests
pub const NEW_MASTER: [u8; 16] = hex!("505152535455565758595a5b5c5d5e5f");

/// Card unique identifier used across tests
pub const CUID: [u8; 10] = hex!("0102030405060708090a");

/// Key derivation data of a real card
pub const KDD: [u8; 10] = hex!("00000265018303953662");

/// Configuration with a DES3 EMV key set, an AES key set and a NIST key set
pub const CONFIG: &str = r#"
shared_secret = "404142434445464748494a4b4c4d4e4f"

[keysets.defKeySet]
auth_key = "404142434445464748494a4b4c4d4e4f"
mac_key = "404142434445464748494a4b4c4d4e4f"
kek_key = "404142434445464748494a4b4c4d4e4f"
diversification = "emv"
nist_sp800_108_kdf_on_key_version = "ff"
nist_sp800_108_kdf_use_cuid_as_kdd = false

[keysets.defKeySet.master_keys."02"]
auth_key = "505152535455565758595a5b5c5d5e5f"
mac_key = "505152535455565758595a5b5c5d5e5f"
kek_key = "505152535455565758595a5b5c5d5e5f"

[keysets.aesKeySet]
auth_key = "404142434445464748494a4b4c4d4e4f"
mac_key = "404142434445464748494a4b4c4d4e4f"
kek_key = "404142434445464748494a4b4c4d4e4f"
key_algorithm = "aes"
diversification = "none"
nist_sp800_108_kdf_on_key_version = "ff"
nist_sp800_108_kdf_use_cuid_as_kdd = false

[keysets.nistKeySet]
nist_sp800_108_kdf_on_key_version = "02"
nist_sp800_108_kdf_use_cuid_as_kdd = false

[keysets.nistKeySet.master_keys."02"]
auth_key = "404142434445464748494a4b4c4d4e4f"
mac_key = "404142434445464748494a4b4c4d4e4f"
kek_key = "404142434445464748494a4b4c4d4e4f"

[keysets.noKdfSetting]
auth_key = "404142434445464748494a4b4c4d4e4f"
mac_key = "404142434445464748494a4b4c4d4e4f"
kek_key = "404142434445464748494a4b4c4d4e4f"
nist_sp800_108_kdf_use_cuid_as_kdd = false
"#;

/// Parse the test configuration
pub fn config() -> TksConfig {
    TksConfig::from_toml_str(CONFIG).expect("test configuration parses")
}

/// Service over a software token loaded from the test configuration
pub fn service() -> TokenKeyService<SoftToken> {
    service_from(config())
}

/// Service over a software token loaded from a configuration
pub fn service_from(config: TksConfig) -> TokenKeyService<SoftToken> {
    let token = SoftToken::from_config(&config).expect("token loads");
    TokenKeyService::new(config, token).expect("service starts")
}
