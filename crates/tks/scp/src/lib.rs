//! GlobalPlatform secure channel key service
//!
//! This crate implements the server side of SCP01, SCP02 and SCP03 secure
//! channel opening for a token key service: card key derivation from master
//! keys, session keys, host and card cryptograms, key wrapping for transport
//! and PUT KEY key set data for key rotation.
//!
//! The main entry point is [`TokenKeyService`], which runs each request
//! against a [`TksConfig`] and a [`Token`] holding the master keys. The
//! lower level modules can be used directly for single computations.

pub mod config;
pub mod constants;
pub mod crypto;
pub mod cryptogram;
pub mod diversify;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod keyset_data;
pub mod resolver;
pub mod service;
pub mod session;
pub mod token;
pub mod types;
pub mod util;
pub mod wrap;

// Re-exports
pub use config::{KeySetConfig, TksConfig};
pub use cryptogram::{Role, compute_cryptogram, verify, verify_card_cryptogram};
pub use diversify::{DiversificationScheme, KeyRotation, diversify, rotate};
pub use error::{Error, ErrorKind, Result, Status, TokenError};
pub use kdf::{KdfScheme, derive_card_keys};
pub use keys::{KeyAlgorithm, KeyType, StaticKeys, SymmetricKey};
pub use resolver::{ProtocolParameters, resolve};
pub use session::{DerivationConstant, SessionKeys, compute_session_key, compute_session_keys};
pub use token::{SerializedToken, SoftToken, Token};
pub use types::{CardIdentity, Challenges, Cryptogram, KeyInfo, KeyVersion, Protocol};
pub use wrap::{
    KeyCheckValue, ServerSideKeyMaterial, ServerSideKeygen, SharedSecret, TransportKey, WrappedKey,
};

// Export service requests and responses
pub use service::{
    EncryptDataRequest, EncryptDataResponse, KeySetDataRequest, Scp02Request, Scp02Response,
    SessionRequest, SessionResponse, TokenKeyService,
};
