//! Command handlers for the TKS tool

use eyre::Result;
use tks_scp::wrap::compute_key_check_value;
use tks_scp::{
    EncryptDataRequest, KeySetDataRequest, Protocol, Scp02Request, ServerSideKeygen,
    SessionRequest, SoftToken, SymmetricKey, TokenKeyService,
};

use crate::utils::{AlgorithmArg, CardArgs, ProtocolArg, parse_hex};

type Service = TokenKeyService<SoftToken>;

fn print_keygen(keygen: &ServerSideKeygen) {
    match keygen {
        ServerSideKeygen::NotRequested => {}
        ServerSideKeygen::Generated(material) => {
            println!("kek_wrapped_key: {}", hex::encode(material.kek_wrapped.as_bytes()));
            println!(
                "transport_wrapped_key: {}",
                hex::encode(material.transport_wrapped.as_bytes())
            );
            println!("key_check: {}", hex::encode(material.key_check));
        }
        ServerSideKeygen::Failed(status) => {
            println!("server_side_keygen_status: {}", status.code());
        }
    }
}

/// Compute SCP01 or SCP03 session keys
#[allow(clippy::too_many_arguments)]
pub fn session_keys_command(
    service: &Service,
    card: &CardArgs,
    protocol: ProtocolArg,
    card_challenge: &str,
    host_challenge: &str,
    card_cryptogram: Option<&str>,
    rmac: bool,
    keygen: bool,
) -> Result<()> {
    let request = SessionRequest {
        key_set: card.key_set.clone(),
        protocol: protocol.into(),
        key_info: card.key_info()?,
        cuid: card.cuid()?,
        kdd: card.kdd()?,
        card_challenge: parse_hex("card challenge", card_challenge)?,
        host_challenge: parse_hex("host challenge", host_challenge)?,
        card_cryptogram: card_cryptogram
            .map(|value| parse_hex("card cryptogram", value))
            .transpose()?,
        with_rmac: rmac,
        server_side_keygen: keygen,
    };
    let response = service.compute_session_keys(&request)?;

    println!("enc: {}", hex::encode(response.enc.as_bytes()));
    println!("mac: {}", hex::encode(response.mac.as_bytes()));
    println!("kek: {}", hex::encode(response.kek.as_bytes()));
    if let Some(rmac) = &response.rmac {
        println!("rmac: {}", hex::encode(rmac.as_bytes()));
    }
    println!("host_cryptogram: {}", hex::encode(response.host_cryptogram));
    if response.card_cryptogram_verified {
        println!("card_cryptogram: verified");
    }
    print_keygen(&response.server_side_keygen);
    Ok(())
}

/// Compute one SCP02 session key
pub fn scp02_session_key_command(
    service: &Service,
    card: &CardArgs,
    card_challenge: &str,
    host_challenge: Option<&str>,
    constant: &str,
    card_cryptogram: Option<&str>,
    keygen: bool,
) -> Result<()> {
    let request = Scp02Request {
        key_set: card.key_set.clone(),
        key_info: card.key_info()?,
        cuid: card.cuid()?,
        kdd: card.kdd()?,
        card_challenge: parse_hex("card challenge", card_challenge)?,
        host_challenge: host_challenge
            .map(|value| parse_hex("host challenge", value))
            .transpose()?,
        derivation_constant: parse_hex("derivation constant", constant)?,
        card_cryptogram: card_cryptogram
            .map(|value| parse_hex("card cryptogram", value))
            .transpose()?,
        server_side_keygen: keygen,
    };
    let response = service.compute_session_key_scp02(&request)?;

    println!("session_key: {}", hex::encode(response.session_key.as_bytes()));
    if let Some(cryptogram) = response.host_cryptogram {
        println!("host_cryptogram: {}", hex::encode(cryptogram));
    }
    if response.card_cryptogram_verified {
        println!("card_cryptogram: verified");
    }
    print_keygen(&response.server_side_keygen);
    Ok(())
}

/// Build PUT KEY key set data
pub fn key_set_data_command(
    service: &Service,
    card: &CardArgs,
    protocol: ProtocolArg,
    new_key_info: &str,
    sequence_counter: Option<&str>,
) -> Result<()> {
    let request = KeySetDataRequest {
        key_set: card.key_set.clone(),
        protocol: protocol.into(),
        cuid: card.cuid()?,
        kdd: card.kdd()?,
        key_info: card.key_info()?,
        new_key_info: parse_hex("new key info", new_key_info)?,
        sequence_counter: sequence_counter
            .map(|value| parse_hex("sequence counter", value))
            .transpose()?,
    };
    let data = service.create_key_set_data(&request)?;
    println!("key_set_data: {}", hex::encode(data));
    Ok(())
}

/// Encrypt data under the card KEK
pub fn encrypt_data_command(
    service: &Service,
    card: &CardArgs,
    protocol: ProtocolArg,
    data: Option<&str>,
) -> Result<()> {
    let request = EncryptDataRequest {
        key_set: card.key_set.clone(),
        protocol: protocol.into(),
        key_info: card.key_info()?,
        cuid: card.cuid()?,
        kdd: card.kdd()?,
        data: data.map(|value| parse_hex("data", value)).transpose()?,
    };
    let response = service.encrypt_data(&request)?;
    println!("data: {}", hex::encode(&response.data));
    println!("encrypted: {}", hex::encode(&response.encrypted));
    Ok(())
}

/// Print random bytes from the token
pub fn random_command(service: &Service, len: usize) -> Result<()> {
    let data = service.compute_random_data(len)?;
    println!("{}", hex::encode(data));
    Ok(())
}

/// Print the key check value of a key
pub fn kcv_command(key: &str, algorithm: AlgorithmArg) -> Result<()> {
    let key = SymmetricKey::new(algorithm.into(), &parse_hex("key", key)?)?;
    println!("{}", hex::encode(compute_key_check_value(&key)?));
    Ok(())
}

/// Print the card keys of one card
pub fn diversify_command(service: &Service, card: &CardArgs, protocol: ProtocolArg) -> Result<()> {
    let protocol = Protocol::from(protocol);
    let keys = service.diversify(&card.key_set, &card.key_info()?, &card.identity()?, protocol)?;
    println!("enc: {}", hex::encode(keys.enc().as_bytes()));
    println!("mac: {}", hex::encode(keys.mac().as_bytes()));
    println!("kek: {}", hex::encode(keys.kek().as_bytes()));
    Ok(())
}
