//! HOTP ([RFC 4226]) and TOTP ([RFC 6238]) one-time passcodes with
//! pluggable output patterns.
//!
//! Besides plain decimal codes, the built-in [patterns](pattern) produce
//! Steam Guard codes and PIN-salted alphanumeric "mobile" codes. Engines
//! are immutable once built and can be shared between threads.
//!
//! ```no_run
//! use otpgen::{GenerationInput, OneTimePassword, OtpConfig, OtpKind};
//!
//! let config = OtpConfig::new(OtpKind::Hotp)
//!     .with_issuer("Example")
//!     .with_account_name("alice@example.com")
//!     .with_secret("12345678901234567890");
//! let otp = otpgen::new_instance(&config, otpgen::PatternRegistry::builtin())?;
//!
//! let codes = otp.generate_code(&GenerationInput::at_counter(0))?;
//! assert_eq!(codes, ["755224"]);
//! println!("{}", otp.key_uri()?);
//! # Ok::<(), otpgen::OtpError>(())
//! ```
//!
//! [RFC 4226]: https://datatracker.ietf.org/doc/html/rfc4226
//! [RFC 6238]: https://datatracker.ietf.org/doc/html/rfc6238

use std::sync::Arc;

use hmac::{
    digest::{InvalidLength, KeyInit},
    Hmac, Mac,
};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

pub mod algorithm;
pub mod config;
pub mod hotp;
pub mod key_uri;
pub mod pattern;
pub mod secret;
pub mod totp;

pub use algorithm::{Algorithm, Digits};
pub use config::{OtpConfig, OtpKind, OtpParams};
pub use hotp::Hotp;
pub use key_uri::KeyUri;
pub use pattern::{Pattern, PatternRegistry, PatternTag};
pub use secret::Secret;
pub use totp::Totp;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("invalid number of digits: {0}")]
    InvalidDigits(u8),
    #[error("unknown algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("unknown pattern `{0}`")]
    UnknownPattern(String),
    #[error("period must be a positive number of seconds")]
    InvalidPeriod,
    #[error("secret size must be positive")]
    InvalidSecretSize,
    #[error("secret is not valid base32")]
    Decode(#[from] data_encoding::DecodeError),
    #[error("secret must not be empty")]
    EmptySecret,
    #[error("entropy source could not supply a secret")]
    Entropy(#[from] rand::Error),
    #[error("the {0} pattern requires a non-empty salt")]
    MissingSalt(String),
    #[error("expected a code of {expected} characters, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("a counter is required")]
    MissingCounter,
    #[error("error when computing HMAC")]
    HmacError(#[from] InvalidLength),
    #[error("truncation offset {offset} runs past the end of a {len}-byte digest")]
    Truncation { offset: usize, len: usize },
    #[error("code did not match any counter in the window")]
    NoMatch,
    #[error("issuer and account name are required")]
    MissingAccountInfo,
}

/// Coarse classification of an [`OtpError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Secret,
    Input,
    CryptoInternal,
    NoMatch,
    Provisioning,
}

impl OtpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OtpError::InvalidDigits(_)
            | OtpError::UnknownAlgorithm(_)
            | OtpError::UnknownPattern(_)
            | OtpError::InvalidPeriod
            | OtpError::InvalidSecretSize => ErrorKind::Configuration,
            OtpError::Decode(_) | OtpError::EmptySecret | OtpError::Entropy(_) => ErrorKind::Secret,
            OtpError::MissingSalt(_)
            | OtpError::LengthMismatch { .. }
            | OtpError::MissingCounter => ErrorKind::Input,
            OtpError::HmacError(_) | OtpError::Truncation { .. } => ErrorKind::CryptoInternal,
            OtpError::NoMatch => ErrorKind::NoMatch,
            OtpError::MissingAccountInfo => ErrorKind::Provisioning,
        }
    }
}

pub type OtpResult<T> = std::result::Result<T, OtpError>;

/// Per-call arguments: an explicit counter and the salt (PIN) required by
/// salted patterns.
///
/// HOTP engines require the counter. TOTP engines derive it from the clock
/// unless one is given, in which case it is used as the time step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationInput {
    counter: Option<u64>,
    salt: Option<String>,
}

impl GenerationInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_counter(counter: u64) -> Self {
        Self::new().with_counter(counter)
    }

    pub fn with_counter(mut self, counter: u64) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn counter(&self) -> Option<u64> {
        self.counter
    }

    /// The salt, with an empty string treated as absent.
    pub fn salt(&self) -> Option<&str> {
        self.salt.as_deref().filter(|s| !s.is_empty())
    }
}

/// Operations shared by the HOTP and TOTP engines.
pub trait OneTimePassword: Send + Sync {
    /// Every code currently acceptable for `input`, preferred first.
    fn generate_code(&self, input: &GenerationInput) -> OtpResult<Vec<String>>;

    /// Check `code` against `input`.
    ///
    /// HOTP engines return `Ok(false)` on a mismatch; TOTP engines report an
    /// exhausted window as [`OtpError::NoMatch`].
    fn validate(&self, code: &str, input: &GenerationInput) -> OtpResult<bool>;

    /// The `otpauth://` provisioning URI for authenticator apps.
    fn key_uri(&self) -> OtpResult<String>;
}

/// Build the engine selected by `config.kind`.
pub fn new_instance(
    config: &OtpConfig,
    patterns: Arc<PatternRegistry>,
) -> OtpResult<Box<dyn OneTimePassword>> {
    let params = config.params()?;
    match config.kind {
        OtpKind::Hotp => Ok(Box::new(Hotp::new(params, patterns)?)),
        OtpKind::Totp => Ok(Box::new(Totp::new(
            params,
            config.period()?,
            config.skew,
            patterns,
        )?)),
    }
}

/// Provisioning URI for `config`, using the built-in patterns.
pub fn generate_key(config: &OtpConfig) -> OtpResult<String> {
    new_instance(config, PatternRegistry::builtin())?.key_uri()
}

/// Codes for `config`, using the built-in patterns.
pub fn generate_code(config: &OtpConfig, input: &GenerationInput) -> OtpResult<Vec<String>> {
    new_instance(config, PatternRegistry::builtin())?.generate_code(input)
}

/// Whether `code` is acceptable for `config`. Every failure, including a
/// malformed configuration, counts as a rejection.
pub fn validate(config: &OtpConfig, code: &str, input: &GenerationInput) -> bool {
    let result = new_instance(config, PatternRegistry::builtin())
        .and_then(|otp| otp.validate(code, input));
    match result {
        Ok(valid) => valid,
        Err(err) => {
            tracing::debug!(error = %err, kind = ?err.kind(), "code rejected");
            false
        }
    }
}

fn hmac(algorithm: Algorithm, key: &[u8], message: &[u8]) -> OtpResult<Vec<u8>> {
    fn sign<M: Mac + KeyInit>(key: &[u8], message: &[u8]) -> OtpResult<Vec<u8>> {
        let mut mac = <M as KeyInit>::new_from_slice(key)?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    match algorithm {
        Algorithm::Sha1 => sign::<Hmac<Sha1>>(key, message),
        Algorithm::Sha256 => sign::<Hmac<Sha256>>(key, message),
        Algorithm::Sha512 => sign::<Hmac<Sha512>>(key, message),
        Algorithm::Md5 => sign::<Hmac<Md5>>(key, message),
    }
}

/// Dynamic truncation (RFC 4226 §5.3): four bytes at the offset named by
/// the digest's low nibble, with the sign bit cleared.
fn dt(hs: &[u8]) -> OtpResult<[u8; 4]> {
    let offset = dt_offset(hs);
    let mut substr = dt_substr(hs, offset)?;
    substr[0] &= 0b0111_1111;
    Ok(substr)
}

fn dt_substr(hs: &[u8], offset: usize) -> OtpResult<[u8; 4]> {
    hs.get(offset..offset + 4)
        .and_then(|substr| <[u8; 4]>::try_from(substr).ok())
        .ok_or(OtpError::Truncation {
            offset,
            len: hs.len(),
        })
}

fn dt_offset(hs: &[u8]) -> usize {
    hs.last().map_or(0, |last| usize::from(last & 0b1111))
}
