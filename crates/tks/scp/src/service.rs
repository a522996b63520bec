//! Token key service
//!
//! Request level operations of the token key service. Each operation
//! validates its inputs, resolves the key set's protocol parameters, fetches
//! master keys from the token, derives the card keys and then computes
//! session keys, cryptograms or key set data from them.

use tracing::{info, warn};

use crate::config::{GLOBAL_SCOPE, TksConfig};
use crate::constants::{CRYPTOGRAM_LENGTH, MAX_RANDOM_DATA_LENGTH};
use crate::crypto::encrypt_ecb;
use crate::cryptogram::{Role, compute_cryptogram, verify_card_cryptogram};
use crate::diversify::rotate;
use crate::error::Status;
use crate::kdf::derive_card_keys;
use crate::keys::{StaticKeys, SymmetricKey};
use crate::keyset_data::{create_key_set_data, wrapping_key};
use crate::resolver::{ProtocolParameters, resolve};
use crate::session::{DerivationConstant, compute_session_keys, scp02_session_key};
use crate::token::Token;
use crate::types::{CardIdentity, Challenges, Cryptogram, Protocol};
use crate::util::{check_length, to_array};
use crate::wrap::{
    ServerSideKeygen, SharedSecret, TransportKey, WrappedKey, server_side_keygen,
    wrap_under_shared_secret,
};
use crate::{Error, Result};

/// Length of the random data encrypted when a caller supplies none
const DEFAULT_ENCRYPT_DATA_LEN: usize = 16;

/// Session key request for SCP01 or SCP03
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Key set name
    pub key_set: String,
    /// Secure channel protocol (SCP01 or SCP03)
    pub protocol: Protocol,
    /// Key info returned by INITIALIZE UPDATE
    pub key_info: Vec<u8>,
    /// Card unique identifier
    pub cuid: Vec<u8>,
    /// Key derivation data; the CUID when absent
    pub kdd: Option<Vec<u8>>,
    /// Card challenge
    pub card_challenge: Vec<u8>,
    /// Host challenge
    pub host_challenge: Vec<u8>,
    /// Card cryptogram to verify
    pub card_cryptogram: Option<Vec<u8>>,
    /// Also derive the response MAC key
    pub with_rmac: bool,
    /// Generate and wrap a key on the server side
    pub server_side_keygen: bool,
}

/// Session keys wrapped for the token processing system
#[derive(Debug, Clone)]
pub struct SessionResponse {
    /// Session encryption key
    pub enc: WrappedKey,
    /// Command MAC key
    pub mac: WrappedKey,
    /// Data encryption key
    pub kek: WrappedKey,
    /// Response MAC key, when requested
    pub rmac: Option<WrappedKey>,
    /// Host cryptogram for EXTERNAL AUTHENTICATE
    pub host_cryptogram: Cryptogram,
    /// Whether a supplied card cryptogram was verified
    pub card_cryptogram_verified: bool,
    /// Server-side key generation outcome
    pub server_side_keygen: ServerSideKeygen,
}

/// Single session key request for SCP02
#[derive(Debug, Clone)]
pub struct Scp02Request {
    /// Key set name
    pub key_set: String,
    /// Key info returned by INITIALIZE UPDATE
    pub key_info: Vec<u8>,
    /// Card unique identifier
    pub cuid: Vec<u8>,
    /// Key derivation data; the CUID when absent
    pub kdd: Option<Vec<u8>>,
    /// Card challenge field: sequence counter and six byte card challenge
    pub card_challenge: Vec<u8>,
    /// Host challenge, needed for cryptograms
    pub host_challenge: Option<Vec<u8>>,
    /// Two byte derivation constant
    pub derivation_constant: Vec<u8>,
    /// Card cryptogram to verify (S-ENC requests only)
    pub card_cryptogram: Option<Vec<u8>>,
    /// Generate and wrap a key on the server side (DEK requests only)
    pub server_side_keygen: bool,
}

/// Wrapped SCP02 session key
#[derive(Debug, Clone)]
pub struct Scp02Response {
    /// Session key wrapped under the shared secret
    pub session_key: WrappedKey,
    /// Host cryptogram, for S-ENC requests with a host challenge
    pub host_cryptogram: Option<Cryptogram>,
    /// Whether a supplied card cryptogram was verified
    pub card_cryptogram_verified: bool,
    /// Server-side key generation outcome
    pub server_side_keygen: ServerSideKeygen,
}

/// Key rotation request
#[derive(Debug, Clone)]
pub struct KeySetDataRequest {
    /// Key set name
    pub key_set: String,
    /// Secure channel protocol
    pub protocol: Protocol,
    /// Card unique identifier
    pub cuid: Vec<u8>,
    /// Key derivation data; the CUID when absent
    pub kdd: Option<Vec<u8>>,
    /// Key info of the keys currently on the card
    pub key_info: Vec<u8>,
    /// Key info of the replacement keys
    pub new_key_info: Vec<u8>,
    /// SCP02 sequence counter of the current channel
    pub sequence_counter: Option<Vec<u8>>,
}

/// Data encryption request
#[derive(Debug, Clone)]
pub struct EncryptDataRequest {
    /// Key set name
    pub key_set: String,
    /// Secure channel protocol
    pub protocol: Protocol,
    /// Key info of the card keys
    pub key_info: Vec<u8>,
    /// Card unique identifier
    pub cuid: Vec<u8>,
    /// Key derivation data; the CUID when absent
    pub kdd: Option<Vec<u8>>,
    /// Data to encrypt; random data is generated when absent
    pub data: Option<Vec<u8>>,
}

/// Encrypted data
#[derive(Debug, Clone)]
pub struct EncryptDataResponse {
    /// Plain data (the generated data when none was supplied)
    pub data: Vec<u8>,
    /// Data encrypted under the card KEK
    pub encrypted: Vec<u8>,
}

/// Token key service
#[derive(Debug)]
pub struct TokenKeyService<T> {
    config: TksConfig,
    token: T,
    shared_secret: SharedSecret,
    transport: Option<TransportKey>,
}

impl<T: Token> TokenKeyService<T> {
    /// Create a service; the shared secret is required, the transport key is
    /// loaded when configured
    pub fn new(config: TksConfig, token: T) -> Result<Self> {
        let shared_secret = SharedSecret::new(config.shared_secret()?);
        let transport = config
            .transport_key
            .as_deref()
            .map(|path| {
                let invalid = |reason: String| Error::InvalidSetting {
                    scope: GLOBAL_SCOPE.to_owned(),
                    setting: "transport_key",
                    reason,
                };
                let bytes = std::fs::read(path).map_err(|err| invalid(err.to_string()))?;
                TransportKey::from_bytes(&bytes).map_err(|err| invalid(err.to_string()))
            })
            .transpose()?;

        info!(
            token = token.name(),
            key_sets = config.keysets.len(),
            transport_key = transport.is_some(),
            "token key service ready"
        );
        Ok(Self {
            config,
            token,
            shared_secret,
            transport,
        })
    }

    /// Use a transport key for server-side key generation
    pub fn with_transport_key(mut self, transport: TransportKey) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shared secret used to wrap session keys
    pub const fn shared_secret(&self) -> &SharedSecret {
        &self.shared_secret
    }

    fn card_keys(
        &self,
        key_set: &str,
        key_info: &[u8],
        protocol: Protocol,
        identity: &CardIdentity,
    ) -> Result<(ProtocolParameters, StaticKeys)> {
        let params = resolve(key_set, self.config.key_set(key_set)?, key_info, protocol)?;
        let master = self.token.master_keys(key_set, params.key_info.version)?;
        let card_keys = derive_card_keys(&master, identity, &params)?;
        Ok((params, card_keys))
    }

    fn generate_server_side_key(&self, requested: bool, kek: &SymmetricKey) -> ServerSideKeygen {
        if !requested {
            return ServerSideKeygen::NotRequested;
        }
        let Some(transport) = &self.transport else {
            warn!("server-side key generation requested without a transport key");
            return ServerSideKeygen::Failed(Status::KeyGenerationFailure);
        };
        match server_side_keygen(&self.token, kek, transport) {
            Ok(material) => ServerSideKeygen::Generated(material),
            Err(err) => {
                warn!(%err, "server-side key generation failed");
                ServerSideKeygen::Failed(err.status())
            }
        }
    }

    /// Compute SCP01 or SCP03 session keys and the host cryptogram
    pub fn compute_session_keys(&self, request: &SessionRequest) -> Result<SessionResponse> {
        let protocol = request.protocol;
        if protocol == Protocol::Scp02 {
            return Err(Error::InvalidParameter {
                name: "protocol",
                reason: "SCP02 session keys are computed one at a time".into(),
            });
        }
        let identity = CardIdentity::new(&request.cuid, request.kdd.as_deref())?;
        let challenges = Challenges::new(&request.card_challenge, &request.host_challenge)?;
        if let Some(cryptogram) = &request.card_cryptogram {
            check_length("card cryptogram", cryptogram, CRYPTOGRAM_LENGTH)?;
        }

        let (params, card_keys) =
            self.card_keys(&request.key_set, &request.key_info, protocol, &identity)?;
        let session = compute_session_keys(
            &card_keys,
            &challenges,
            &params.key_info,
            protocol,
            request.with_rmac,
        )?;

        let cryptogram_key = session.cryptogram_key(protocol);
        if let Some(cryptogram) = &request.card_cryptogram {
            verify_card_cryptogram(cryptogram_key, &challenges, protocol, cryptogram)?;
        }
        let host_cryptogram =
            compute_cryptogram(cryptogram_key, &challenges, Role::Host, protocol)?;

        let response = SessionResponse {
            enc: wrap_under_shared_secret(&self.shared_secret, session.enc())?,
            mac: wrap_under_shared_secret(&self.shared_secret, session.mac())?,
            kek: wrap_under_shared_secret(&self.shared_secret, session.kek())?,
            rmac: session
                .rmac()
                .map(|key| wrap_under_shared_secret(&self.shared_secret, key))
                .transpose()?,
            host_cryptogram,
            card_cryptogram_verified: request.card_cryptogram.is_some(),
            server_side_keygen: self
                .generate_server_side_key(request.server_side_keygen, session.kek()),
        };

        info!(
            key_set = %request.key_set,
            %protocol,
            version = %params.key_info.version,
            "computed session keys"
        );
        Ok(response)
    }

    /// Compute one SCP02 session key
    pub fn compute_session_key_scp02(&self, request: &Scp02Request) -> Result<Scp02Response> {
        let protocol = Protocol::Scp02;
        let constant = DerivationConstant::from_scp02_bytes(&request.derivation_constant)?;
        let identity = CardIdentity::new(&request.cuid, request.kdd.as_deref())?;
        let card_field: [u8; 8] = to_array("card challenge", &request.card_challenge)?;
        let challenges = request
            .host_challenge
            .as_deref()
            .map(|host| Challenges::new(&card_field, host))
            .transpose()?;
        if let Some(cryptogram) = &request.card_cryptogram {
            check_length("card cryptogram", cryptogram, CRYPTOGRAM_LENGTH)?;
            if constant != DerivationConstant::SEnc {
                return Err(Error::InvalidParameter {
                    name: "card cryptogram",
                    reason: "only S-ENC requests verify the card cryptogram".into(),
                });
            }
            if challenges.is_none() {
                return Err(Error::MissingParameter("host challenge"));
            }
        }

        let (params, card_keys) =
            self.card_keys(&request.key_set, &request.key_info, protocol, &identity)?;
        let sequence_counter = [card_field[0], card_field[1]];
        let session_key = scp02_session_key(
            card_keys.get(constant.static_key()),
            constant,
            &sequence_counter,
        )?;

        let mut host_cryptogram = None;
        let mut card_cryptogram_verified = false;
        if let (DerivationConstant::SEnc, Some(challenges)) = (constant, &challenges) {
            if let Some(cryptogram) = &request.card_cryptogram {
                verify_card_cryptogram(&session_key, challenges, protocol, cryptogram)?;
                card_cryptogram_verified = true;
            }
            host_cryptogram =
                Some(compute_cryptogram(&session_key, challenges, Role::Host, protocol)?);
        }

        let server_side_keygen = if constant == DerivationConstant::Dek {
            self.generate_server_side_key(request.server_side_keygen, &session_key)
        } else {
            ServerSideKeygen::NotRequested
        };

        info!(
            key_set = %request.key_set,
            ?constant,
            version = %params.key_info.version,
            "computed SCP02 session key"
        );
        Ok(Scp02Response {
            session_key: wrap_under_shared_secret(&self.shared_secret, &session_key)?,
            host_cryptogram,
            card_cryptogram_verified,
            server_side_keygen,
        })
    }

    /// Build PUT KEY key set data moving a card to new keys
    pub fn create_key_set_data(&self, request: &KeySetDataRequest) -> Result<Vec<u8>> {
        let protocol = request.protocol;
        let identity = CardIdentity::new(&request.cuid, request.kdd.as_deref())?;
        let sequence_counter = request
            .sequence_counter
            .as_deref()
            .map(|counter| to_array::<2>("sequence counter", counter))
            .transpose()?;
        if protocol == Protocol::Scp02 && sequence_counter.is_none() {
            return Err(Error::MissingParameter("sequence counter"));
        }

        let config = self.config.key_set(&request.key_set)?;
        let old_params = resolve(&request.key_set, config, &request.key_info, protocol)?;
        let new_params = resolve(&request.key_set, config, &request.new_key_info, protocol)?;

        let old_master = self
            .token
            .master_keys(&request.key_set, old_params.key_info.version)?;
        let new_master = self
            .token
            .master_keys(&request.key_set, new_params.key_info.version)?;
        let rotation = rotate(&old_master, &old_params, &new_master, &new_params, &identity)?;

        let wrapping = wrapping_key(&rotation.old, protocol, sequence_counter.as_ref())?;
        let data = create_key_set_data(
            new_params.key_info.version,
            &rotation.new,
            &wrapping,
            protocol,
        )?;

        info!(
            key_set = %request.key_set,
            %protocol,
            from = %old_params.key_info.version,
            to = %new_params.key_info.version,
            "created key set data"
        );
        Ok(data)
    }

    /// Encrypt data under the card KEK
    pub fn encrypt_data(&self, request: &EncryptDataRequest) -> Result<EncryptDataResponse> {
        let protocol = request.protocol;
        let identity = CardIdentity::new(&request.cuid, request.kdd.as_deref())?;
        let block_size = protocol.key_algorithm().block_size();
        if let Some(data) = &request.data {
            if data.is_empty() || data.len() % block_size != 0 {
                return Err(Error::InvalidParameter {
                    name: "data",
                    reason: format!("length must be a non-zero multiple of {block_size}"),
                });
            }
        }

        let (_, card_keys) =
            self.card_keys(&request.key_set, &request.key_info, protocol, &identity)?;
        let data = match &request.data {
            Some(data) => data.clone(),
            None => self.compute_random_data(DEFAULT_ENCRYPT_DATA_LEN)?,
        };
        let encrypted = encrypt_ecb(card_keys.kek(), &data)?.to_vec();

        info!(key_set = %request.key_set, %protocol, len = data.len(), "encrypted data");
        Ok(EncryptDataResponse { data, encrypted })
    }

    /// Random bytes from the token's CSPRNG
    pub fn compute_random_data(&self, len: usize) -> Result<Vec<u8>> {
        if len == 0 || len > MAX_RANDOM_DATA_LENGTH {
            return Err(Error::InvalidParameter {
                name: "data length",
                reason: format!("{len} is outside 1..={MAX_RANDOM_DATA_LENGTH}"),
            });
        }
        let mut data = vec![0u8; len];
        self.token.fill_random(&mut data)?;
        Ok(data)
    }

    /// Card keys of one card, for diagnostics
    pub fn diversify(
        &self,
        key_set: &str,
        key_info: &[u8],
        identity: &CardIdentity,
        protocol: Protocol,
    ) -> Result<StaticKeys> {
        self.card_keys(key_set, key_info, protocol, identity)
            .map(|(_, keys)| keys)
    }
}
