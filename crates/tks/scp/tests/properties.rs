//! Properties that hold across key sets, protocols and key versions

mod common;

use common::{CUID, GP_KEY, NEW_MASTER, config};
use hex_literal::hex;
use tks_scp::kdf::derive_card_keys;
use tks_scp::wrap::{unwrap_under_shared_secret, wrap_under_shared_secret};
use tks_scp::{
    CardIdentity, Challenges, DiversificationScheme, KdfScheme, KeyAlgorithm, KeySetConfig,
    KeyVersion, Protocol, Role, SharedSecret, StaticKeys, Status, SymmetricKey,
    compute_cryptogram, compute_session_keys, diversify, resolve, rotate, verify,
};

fn key_set(threshold: u8) -> KeySetConfig {
    KeySetConfig {
        nist_sp800_108_kdf_on_key_version: Some(format!("{threshold:02x}")),
        nist_sp800_108_kdf_use_cuid_as_kdd: Some(false),
        ..KeySetConfig::default()
    }
}

fn assert_kdf_grid(config: &KeySetConfig, protocol: Protocol, key_info: impl Fn(u8) -> Vec<u8>) {
    for threshold in 0..=u8::MAX {
        let config = KeySetConfig {
            nist_sp800_108_kdf_on_key_version: Some(format!("{threshold:02x}")),
            ..config.clone()
        };
        for version in 0..=u8::MAX {
            let params = resolve("grid", &config, &key_info(version), protocol).unwrap();
            let expected = if version >= threshold {
                KdfScheme::NistSp800_108
            } else {
                KdfScheme::Legacy
            };
            assert_eq!(
                params.kdf, expected,
                "{protocol} version {version:#04x} threshold {threshold:#04x}"
            );
            assert_eq!(params.kdf_threshold, KeyVersion(threshold));
            assert_eq!(params.key_info.version, KeyVersion(version));
        }
    }
}

#[test]
fn test_kdf_selection_over_all_versions() {
    assert_kdf_grid(&key_set(0), Protocol::Scp02, |version| vec![version, 0x01]);
}

#[test]
fn test_kdf_selection_over_all_scp03_versions() {
    let config = KeySetConfig {
        key_algorithm: KeyAlgorithm::Aes,
        ..key_set(0)
    };
    assert_kdf_grid(&config, Protocol::Scp03, |version| vec![version, 0x01, 0x70]);
}

#[test]
fn test_session_keys_and_cryptograms_are_deterministic() {
    let master = StaticKeys::from_single_key(SymmetricKey::des3(&GP_KEY).unwrap());
    let identity = CardIdentity::new(&CUID, None).unwrap();
    let config = config();
    let params = resolve(
        "defKeySet",
        config.key_set("defKeySet").unwrap(),
        &hex!("0101"),
        Protocol::Scp02,
    )
    .unwrap();
    let challenges = Challenges::new(&hex!("000de9c62ba1c4c8"), &hex!("f0467f908e5ca23f")).unwrap();

    let run = || {
        let card_keys = derive_card_keys(&master, &identity, &params).unwrap();
        let session =
            compute_session_keys(&card_keys, &challenges, &params.key_info, Protocol::Scp02, true)
                .unwrap();
        let host = compute_cryptogram(
            session.cryptogram_key(Protocol::Scp02),
            &challenges,
            Role::Host,
            Protocol::Scp02,
        )
        .unwrap();
        (session.enc().clone(), session.mac().clone(), host)
    };
    assert_eq!(run(), run());
}

#[test]
fn test_shared_secret_round_trip() {
    for algorithm in [KeyAlgorithm::Des3, KeyAlgorithm::Aes] {
        let secret = SharedSecret::new(SymmetricKey::new(algorithm, &GP_KEY).unwrap());
        let key = SymmetricKey::new(algorithm, &NEW_MASTER).unwrap();
        let wrapped = wrap_under_shared_secret(&secret, &key).unwrap();
        assert_ne!(wrapped.as_bytes(), key.as_bytes());
        let unwrapped = unwrap_under_shared_secret(&secret, wrapped.as_bytes(), algorithm).unwrap();
        assert_eq!(unwrapped, key);
    }
}

#[test]
fn test_verify_requires_exact_match() {
    let cryptogram = hex!("3ce060483aace927");
    assert!(verify(&cryptogram, &cryptogram));
    for index in 0..cryptogram.len() {
        let mut flipped = cryptogram;
        flipped[index] ^= 0x01;
        assert!(!verify(&flipped, &cryptogram));
    }
    assert!(!verify(&cryptogram[..7], &cryptogram));
}

#[test]
fn test_rotation_matches_diversification() {
    let old_master = StaticKeys::from_single_key(SymmetricKey::des3(&GP_KEY).unwrap());
    let new_master = StaticKeys::from_single_key(SymmetricKey::des3(&NEW_MASTER).unwrap());
    let identity = CardIdentity::new(&CUID, None).unwrap();
    let config = config();
    let key_set = config.key_set("defKeySet").unwrap();
    let old_params = resolve("defKeySet", key_set, &hex!("0101"), Protocol::Scp02).unwrap();
    let new_params = resolve("defKeySet", key_set, &hex!("0201"), Protocol::Scp02).unwrap();

    let rotation = rotate(&old_master, &old_params, &new_master, &new_params, &identity).unwrap();
    assert_eq!(
        rotation.new,
        diversify(&new_master, &identity, DiversificationScheme::Emv).unwrap()
    );
    assert_eq!(
        rotation.old,
        diversify(&old_master, &identity, DiversificationScheme::Emv).unwrap()
    );
}

#[test]
fn test_missing_kdf_threshold_is_never_defaulted() {
    let config = config();
    let key_set = config.key_set("noKdfSetting").unwrap();
    for protocol in [Protocol::Scp01, Protocol::Scp02] {
        let err = resolve("noKdfSetting", key_set, &hex!("0101"), protocol).unwrap_err();
        assert_eq!(err.status(), Status::MissingConfiguration);
    }
}

#[test]
fn test_invalid_kdf_threshold() {
    let mut key_set = key_set(0);
    key_set.nist_sp800_108_kdf_on_key_version = Some("0x1ff".into());
    let err = resolve("grid", &key_set, &hex!("0101"), Protocol::Scp02).unwrap_err();
    assert_eq!(err.status(), Status::MissingConfiguration);
    assert!(err.to_string().contains("grid.nist_sp800_108_kdf_on_key_version"));

    key_set.nist_sp800_108_kdf_on_key_version = Some("+f".into());
    let err = resolve("grid", &key_set, &hex!("0101"), Protocol::Scp02).unwrap_err();
    assert_eq!(err.status(), Status::MissingConfiguration);
}

#[test]
fn test_rotation_fails_as_a_whole() {
    let des_master = StaticKeys::from_single_key(SymmetricKey::des3(&GP_KEY).unwrap());
    let aes_master = StaticKeys::from_single_key(SymmetricKey::aes(&NEW_MASTER).unwrap());
    let identity = CardIdentity::new(&CUID, None).unwrap();
    let config = config();
    let key_set = config.key_set("defKeySet").unwrap();
    let old_params = resolve("defKeySet", key_set, &hex!("0101"), Protocol::Scp02).unwrap();
    let new_params = resolve("defKeySet", key_set, &hex!("0201"), Protocol::Scp02).unwrap();

    let result = rotate(&des_master, &old_params, &aes_master, &new_params, &identity);
    assert!(result.is_err());
}
