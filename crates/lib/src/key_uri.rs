//! `otpauth://` provisioning URIs, as read by authenticator apps from QR
//! codes.

use std::collections::BTreeMap;

use urlencoding::encode;

use crate::algorithm::{Algorithm, Digits};
use crate::{OtpError, OtpResult};

/// Parts of an `otpauth://<host>/<issuer>:<account>?<query>` URI.
///
/// Query parameters are emitted sorted by key so the same parameters
/// always produce the same URI.
#[derive(Clone, Copy, Debug)]
pub struct KeyUri<'a> {
    /// `hotp`, `totp`, or a pattern-specific host such as `steam`.
    pub host: &'a str,
    pub issuer: &'a str,
    pub account_name: &'a str,
    /// Unpadded Base32 secret.
    pub secret: &'a str,
    pub algorithm: Algorithm,
    pub digits: Digits,
    /// TOTP period in seconds; omitted for HOTP.
    pub period: Option<u64>,
}

impl KeyUri<'_> {
    pub fn build(&self) -> OtpResult<String> {
        if self.issuer.is_empty() || self.account_name.is_empty() {
            return Err(OtpError::MissingAccountInfo);
        }

        let mut query = BTreeMap::new();
        query.insert("secret", self.secret.to_string());
        query.insert("issuer", self.issuer.to_string());
        query.insert("algorithm", self.algorithm.to_string());
        query.insert("digits", self.digits.to_string());
        if let Some(period) = self.period {
            query.insert("period", period.to_string());
        }
        let query = query
            .iter()
            .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!(
            "otpauth://{}/{}:{}?{}",
            self.host,
            encode(self.issuer),
            encode(self.account_name),
            query
        ))
    }
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use super::KeyUri;
    use crate::{Algorithm, Digits, OtpError};

    fn uri(host: &'static str, period: Option<u64>) -> KeyUri<'static> {
        KeyUri {
            host,
            issuer: "X",
            account_name: "y@example.com",
            secret: "MRUGYYLOONUGC3Q",
            algorithm: Algorithm::Sha1,
            digits: Digits::SIX,
            period,
        }
    }

    #[test]
    fn it_builds_hotp_uris() {
        assert_eq!(
            uri("hotp", None).build().unwrap(),
            "otpauth://hotp/X:y%40example.com?algorithm=SHA1&digits=6&issuer=X&secret=MRUGYYLOONUGC3Q"
        );
    }

    #[test]
    fn it_builds_totp_uris_with_a_sorted_period() {
        assert_eq!(
            uri("totp", Some(30)).build().unwrap(),
            "otpauth://totp/X:y%40example.com?algorithm=SHA1&digits=6&issuer=X&period=30&secret=MRUGYYLOONUGC3Q"
        );
    }

    #[test]
    fn it_percent_encodes_labels_and_values() {
        let uri = KeyUri {
            issuer: "ACME Co",
            account_name: "john doe",
            algorithm: Algorithm::Sha256,
            digits: Digits::EIGHT,
            ..uri("totp", Some(60))
        };
        assert_eq!(
            uri.build().unwrap(),
            "otpauth://totp/ACME%20Co:john%20doe?algorithm=SHA256&digits=8&issuer=ACME%20Co&period=60&secret=MRUGYYLOONUGC3Q"
        );
    }

    #[test_case("", "y@example.com")]
    #[test_case("X", "")]
    fn it_requires_account_info(issuer: &str, account_name: &str) {
        let uri = KeyUri {
            issuer,
            account_name,
            ..uri("hotp", None)
        };
        assert!(matches!(uri.build(), Err(OtpError::MissingAccountInfo)));
    }
}
