//! Argument types shared by the TKS tool commands

use clap::{Args, ValueEnum};
use eyre::{Result, WrapErr};
use tks_scp::{CardIdentity, KeyAlgorithm, Protocol};

/// Secure channel protocol argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProtocolArg {
    /// SCP01
    Scp01,
    /// SCP02
    Scp02,
    /// SCP03
    Scp03,
}

impl From<ProtocolArg> for Protocol {
    fn from(value: ProtocolArg) -> Self {
        match value {
            ProtocolArg::Scp01 => Self::Scp01,
            ProtocolArg::Scp02 => Self::Scp02,
            ProtocolArg::Scp03 => Self::Scp03,
        }
    }
}

/// Key algorithm argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    /// Triple DES
    Des3,
    /// AES
    Aes,
}

impl From<AlgorithmArg> for KeyAlgorithm {
    fn from(value: AlgorithmArg) -> Self {
        match value {
            AlgorithmArg::Des3 => Self::Des3,
            AlgorithmArg::Aes => Self::Aes,
        }
    }
}

/// Card and key set selection common to every card level command
#[derive(Args, Debug, Clone)]
pub struct CardArgs {
    /// Key set name
    #[arg(long, default_value = "defKeySet")]
    pub key_set: String,

    /// Key info from INITIALIZE UPDATE, in hex
    #[arg(long)]
    pub key_info: String,

    /// Card unique identifier, in hex
    #[arg(long)]
    pub cuid: String,

    /// Key derivation data, in hex (defaults to the CUID)
    #[arg(long)]
    pub kdd: Option<String>,
}

impl CardArgs {
    /// Decoded key info
    pub fn key_info(&self) -> Result<Vec<u8>> {
        parse_hex("key info", &self.key_info)
    }

    /// Decoded CUID
    pub fn cuid(&self) -> Result<Vec<u8>> {
        parse_hex("CUID", &self.cuid)
    }

    /// Decoded KDD, when given
    pub fn kdd(&self) -> Result<Option<Vec<u8>>> {
        self.kdd.as_deref().map(|kdd| parse_hex("KDD", kdd)).transpose()
    }

    /// Card identity built from the CUID and KDD
    pub fn identity(&self) -> Result<CardIdentity> {
        Ok(CardIdentity::new(&self.cuid()?, self.kdd()?.as_deref())?)
    }
}

/// Decode a hex argument, accepting an optional `0x` prefix
pub fn parse_hex(name: &str, value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).wrap_err_with(|| format!("{name} is not valid hex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("x", "0x0102").unwrap(), vec![1, 2]);
        assert_eq!(parse_hex("x", " a0ff ").unwrap(), vec![0xa0, 0xff]);
        assert!(parse_hex("x", "abc").is_err());
    }

    #[test]
    fn test_card_identity() {
        let args = CardArgs {
            key_set: "defKeySet".into(),
            key_info: "0101".into(),
            cuid: "0102030405060708090a".into(),
            kdd: None,
        };
        let identity = args.identity().unwrap();
        assert_eq!(identity.kdd(), identity.cuid());
        assert_eq!(args.key_info().unwrap(), vec![1, 1]);
    }
}
