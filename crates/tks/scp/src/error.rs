//! Error and status types for the secure channel core
//!
//! Every failure is classified into one of four [`ErrorKind`]s and maps onto
//! a stable numeric [`Status`] so a boundary layer can report it without
//! looking at message text.

use std::fmt;

/// Result type for secure channel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by a cryptographic token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// No master keys are stored for the key set and version
    #[error("no keys for key set {key_set:?} version {version:#04x}")]
    KeyNotFound {
        /// Key set name
        key_set: String,
        /// Key version that was requested
        version: u8,
    },

    /// The random number generator failed
    #[error("random generator failure: {0}")]
    Random(String),

    /// The token cannot be used
    #[error("token unavailable: {0}")]
    Unavailable(String),
}

/// Error type for secure channel operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Structural validation
    //
    /// Wrong buffer length
    #[error("invalid {field} length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Name of the offending field
        field: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key info bytes do not match the protocol
    #[error("invalid key info: {0}")]
    InvalidKeyInfo(&'static str),

    /// A required request parameter was not supplied
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// A request parameter has an unusable value
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Unsupported SCP version
    #[error("unsupported SCP version: {0}")]
    UnsupportedProtocol(u8),

    //
    // Configuration
    //
    /// A security-relevant setting is absent
    #[error("missing setting {scope}.{setting}")]
    MissingSetting {
        /// Configuration scope (key set name, or `tks` for global settings)
        scope: String,
        /// Setting name
        setting: &'static str,
    },

    /// A setting is present but unusable
    #[error("invalid setting {scope}.{setting}: {reason}")]
    InvalidSetting {
        /// Configuration scope (key set name, or `tks` for global settings)
        scope: String,
        /// Setting name
        setting: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// No key set with that name is configured
    #[error("unknown key set {0:?}")]
    UnknownKeySet(String),

    /// The configuration could not be loaded
    #[error(transparent)]
    Config(#[from] Box<figment::Error>),

    //
    // Token and provider
    //
    /// Token operation failed
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// A cipher operation failed
    #[error("cryptographic error: {0}")]
    Crypto(&'static str),

    /// Wrapping under a transport key failed
    #[error("key wrap failed: {0}")]
    Wrap(String),

    //
    // Verification
    //
    /// The card cryptogram did not match the computed one
    #[error("card cryptogram mismatch")]
    CardCryptogramMismatch,
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Failure class of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, detected before any token operation
    Validation,
    /// Missing or invalid configuration
    Configuration,
    /// Token, key lookup or cipher failure
    Token,
    /// Negative authentication outcome
    Verification,
}

impl Error {
    /// Failure class of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLength { .. }
            | Self::InvalidKeyInfo(_)
            | Self::MissingParameter(_)
            | Self::InvalidParameter { .. }
            | Self::UnsupportedProtocol(_) => ErrorKind::Validation,
            Self::MissingSetting { .. }
            | Self::InvalidSetting { .. }
            | Self::UnknownKeySet(_)
            | Self::Config(_) => ErrorKind::Configuration,
            Self::Token(_) | Self::KeyGeneration(_) | Self::Crypto(_) | Self::Wrap(_) => {
                ErrorKind::Token
            }
            Self::CardCryptogramMismatch => ErrorKind::Verification,
        }
    }

    /// Status code reported for this error
    pub const fn status(&self) -> Status {
        match self {
            Self::InvalidLength { .. }
            | Self::InvalidKeyInfo(_)
            | Self::MissingParameter(_)
            | Self::InvalidParameter { .. }
            | Self::UnsupportedProtocol(_) => Status::MissingParameters,
            Self::MissingSetting { .. }
            | Self::InvalidSetting { .. }
            | Self::UnknownKeySet(_)
            | Self::Config(_) => Status::MissingConfiguration,
            Self::Token(TokenError::Random(_)) => Status::KeyGenerationFailure,
            Self::Token(_) => Status::TokenInfoMissing,
            Self::KeyGeneration(_) | Self::Wrap(_) => Status::KeyGenerationFailure,
            Self::Crypto(_) => Status::CryptogramCreationFailure,
            Self::CardCryptogramMismatch => Status::CardCryptogramMismatch,
        }
    }
}

/// Stable result classification reported to the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Status {
    /// Operation succeeded
    Success = 0,
    /// Generating or wrapping a key failed
    KeyGenerationFailure = 1,
    /// Computing a session key or cryptogram failed
    CryptogramCreationFailure = 2,
    /// The card cryptogram did not verify
    CardCryptogramMismatch = 3,
    /// The token has no key material for the request
    TokenInfoMissing = 4,
    /// Request parameters are missing or malformed
    MissingParameters = 5,
    /// A configuration setting is missing or invalid
    MissingConfiguration = 6,
}

impl Status {
    /// Numeric status code
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Whether this status reports success
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::KeyGenerationFailure => "key generation failure",
            Self::CryptogramCreationFailure => "cryptogram creation failure",
            Self::CardCryptogramMismatch => "card cryptogram mismatch",
            Self::TokenInfoMissing => "token information missing",
            Self::MissingParameters => "missing parameters",
            Self::MissingConfiguration => "missing configuration setting",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        err.status()
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => err.status(),
        }
    }
}
