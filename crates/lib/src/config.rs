use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, Digits};
use crate::pattern::{ForcedParameters, PatternTag};
use crate::secret::{Secret, DEFAULT_SECRET_SIZE};
use crate::{OtpError, OtpResult};

/// Default TOTP period in seconds.
pub const DEFAULT_PERIOD: u64 = 30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpKind {
    Hotp,
    #[default]
    Totp,
}

impl OtpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OtpKind::Hotp => "hotp",
            OtpKind::Totp => "totp",
        }
    }
}

impl fmt::Display for OtpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hotp" => Ok(OtpKind::Hotp),
            "totp" => Ok(OtpKind::Totp),
            other => Err(format!("unknown OTP kind `{other}`")),
        }
    }
}

/// Caller-facing configuration. Unset fields fall back to the RFC defaults
/// when the configuration is resolved.
///
/// At most one of `encoded_secret` and `secret` is used, in that order of
/// preference; with neither, a random secret of `secret_size` bytes is drawn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    pub issuer: String,
    pub account_name: String,
    pub kind: OtpKind,
    pub period: Option<u64>,
    pub skew: u64,
    pub secret_size: Option<usize>,
    pub secret: Option<String>,
    pub encoded_secret: Option<String>,
    pub digits: Option<u8>,
    pub algorithm: Algorithm,
    pub pattern: PatternTag,
    pub host: Option<String>,
}

impl OtpConfig {
    pub fn new(kind: OtpKind) -> Self {
        OtpConfig {
            kind,
            ..Default::default()
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_account_name(mut self, account_name: impl Into<String>) -> Self {
        self.account_name = account_name.into();
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_encoded_secret(mut self, encoded: impl Into<String>) -> Self {
        self.encoded_secret = Some(encoded.into());
        self
    }

    pub fn with_secret_size(mut self, size: usize) -> Self {
        self.secret_size = Some(size);
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_skew(mut self, skew: u64) -> Self {
        self.skew = skew;
        self
    }

    pub fn with_digits(mut self, digits: u8) -> Self {
        self.digits = Some(digits);
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<PatternTag>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Resolve the shared secret: decode `encoded_secret`, else take the
    /// bytes of `secret`, else draw `secret_size` random bytes.
    pub fn secret(&self) -> OtpResult<Secret> {
        if let Some(encoded) = non_empty(&self.encoded_secret) {
            return Secret::from_encoded(encoded);
        }
        if let Some(raw) = non_empty(&self.secret) {
            return Secret::from_bytes(raw.as_bytes());
        }
        Secret::generate(self.secret_size.unwrap_or(DEFAULT_SECRET_SIZE))
    }

    pub fn digits(&self) -> OtpResult<Digits> {
        self.digits.map_or(Ok(Digits::default()), Digits::new)
    }

    pub fn period(&self) -> OtpResult<u64> {
        match self.period {
            None => Ok(DEFAULT_PERIOD),
            Some(0) => Err(OtpError::InvalidPeriod),
            Some(period) => Ok(period),
        }
    }

    /// Resolve everything but the TOTP timing into engine parameters.
    pub fn params(&self) -> OtpResult<OtpParams> {
        Ok(OtpParams {
            secret: self.secret()?,
            algorithm: self.algorithm,
            digits: self.digits()?,
            pattern: self.pattern.clone(),
            issuer: self.issuer.clone(),
            account_name: self.account_name.clone(),
            host: non_empty(&self.host).map(str::to_string),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Resolved parameters an engine is built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtpParams {
    pub secret: Secret,
    pub algorithm: Algorithm,
    pub digits: Digits,
    pub pattern: PatternTag,
    pub issuer: String,
    pub account_name: String,
    /// Overrides the host segment of the provisioning URI.
    pub host: Option<String>,
}

impl OtpParams {
    /// SHA1, six digits, standard pattern, no account information.
    pub fn new(secret: Secret) -> Self {
        OtpParams {
            secret,
            algorithm: Algorithm::default(),
            digits: Digits::default(),
            pattern: PatternTag::default(),
            issuer: String::new(),
            account_name: String::new(),
            host: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_digits(mut self, digits: Digits) -> Self {
        self.digits = digits;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<PatternTag>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_account(
        mut self,
        issuer: impl Into<String>,
        account_name: impl Into<String>,
    ) -> Self {
        self.issuer = issuer.into();
        self.account_name = account_name.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub(crate) fn apply(&mut self, forced: &ForcedParameters) {
        if self.digits != forced.digits || self.algorithm != forced.algorithm {
            tracing::debug!(
                pattern = %self.pattern,
                digits = %forced.digits,
                algorithm = %forced.algorithm,
                "pattern overrides configured digits and algorithm"
            );
        }
        self.digits = forced.digits;
        self.algorithm = forced.algorithm;
    }
}
