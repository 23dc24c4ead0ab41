use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{OtpError, OtpResult};

/// Keyed-hash primitive used to compute the HMAC.
///
/// RFC 4226 prescribes SHA1; RFC 6238 adds SHA256 and SHA512. MD5 is
/// accepted for compatibility with older tokens, but its 16-byte digest
/// can push the dynamic-truncation window past the end of the digest, in
/// which case generation fails with [`OtpError::Truncation`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
    Md5,
}

impl Algorithm {
    /// The name used in provisioning URIs.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Sha1 => "SHA1",
            Algorithm::Sha256 => "SHA256",
            Algorithm::Sha512 => "SHA512",
            Algorithm::Md5 => "MD5",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = OtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Algorithm::Sha1),
            "SHA256" => Ok(Algorithm::Sha256),
            "SHA512" => Ok(Algorithm::Sha512),
            "MD5" => Ok(Algorithm::Md5),
            _ => Err(OtpError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Length of a generated code, in symbols.
///
/// For the standard pattern this is the zero-padding width of the decimal
/// code; for alphabet-based patterns it is the number of symbols emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Digits(u8);

impl Digits {
    pub const FOUR: Digits = Digits(4);
    pub const FIVE: Digits = Digits(5);
    pub const SIX: Digits = Digits(6);
    pub const EIGHT: Digits = Digits(8);

    /// A 31-bit value never has more than ten decimal digits.
    pub const MAX: u8 = 10;

    pub fn new(digits: u8) -> OtpResult<Self> {
        if digits == 0 || digits > Self::MAX {
            return Err(OtpError::InvalidDigits(digits));
        }
        Ok(Digits(digits))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Number of symbols as a `usize`, for formatting widths and loops.
    pub fn width(self) -> usize {
        usize::from(self.0)
    }
}

impl Default for Digits {
    fn default() -> Self {
        Digits::SIX
    }
}

impl TryFrom<u8> for Digits {
    type Error = OtpError;

    fn try_from(digits: u8) -> Result<Self, Self::Error> {
        Digits::new(digits)
    }
}

impl From<Digits> for u8 {
    fn from(digits: Digits) -> Self {
        digits.0
    }
}

impl fmt::Display for Digits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
