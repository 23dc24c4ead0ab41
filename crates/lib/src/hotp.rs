use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::config::OtpParams;
use crate::key_uri::KeyUri;
use crate::pattern::PatternRegistry;
use crate::{dt, hmac, GenerationInput, OneTimePassword, OtpError, OtpResult};

/// HMAC-based one-time passcode
///
/// Computes the passcode for any counter value the caller supplies. The
/// engine keeps no counter state of its own.
#[derive(Clone, Debug)]
pub struct Hotp {
    params: OtpParams,
    patterns: Arc<PatternRegistry>,
}

impl Hotp {
    /// Build an engine from resolved parameters.
    ///
    /// Fails if `params.pattern` is not registered in `patterns`. Patterns
    /// that force their own digits and algorithm (Steam) override `params`
    /// here, once.
    pub fn new(mut params: OtpParams, patterns: Arc<PatternRegistry>) -> OtpResult<Self> {
        if let Some(forced) = patterns.get(&params.pattern)?.forced_parameters() {
            params.apply(&forced);
        }
        tracing::debug!(
            algorithm = %params.algorithm,
            digits = %params.digits,
            pattern = %params.pattern,
            "built HOTP engine"
        );
        Ok(Hotp { params, patterns })
    }

    pub fn params(&self) -> &OtpParams {
        &self.params
    }

    /// Compute the passcode for `counter`.
    pub fn generate_for_counter(&self, counter: u64, salt: Option<&str>) -> OtpResult<String> {
        let pattern = self.patterns.get(&self.params.pattern)?;

        // Step 1: Generate an HMAC value over the (possibly salted) counter
        let message = pattern.transform_counter(counter.to_be_bytes(), salt)?;
        let hs = hmac(self.params.algorithm, self.params.secret.as_bytes(), &message)?;

        // Step 2: Generate a 4-byte string (Dynamic Truncation)
        let sbits = dt(&hs)?;

        // Step 3: Map the 31-bit value to the pattern's alphabet
        let snum = u32::from_be_bytes(sbits);
        Ok(pattern.encode(snum, self.params.digits))
    }

    /// Check `code` against the passcode for `counter`.
    ///
    /// Surrounding whitespace in `code` is ignored. A wrong code is
    /// `Ok(false)`; a missing salt or a code of the wrong length is an error
    /// raised before any HMAC is computed.
    pub fn validate_for_counter(
        &self,
        code: &str,
        counter: u64,
        salt: Option<&str>,
    ) -> OtpResult<bool> {
        self.check_salt(salt)?;
        let code = self.check_length(code)?;

        let expected = self.generate_for_counter(counter, salt)?;
        Ok(expected.as_bytes().ct_eq(code.as_bytes()).into())
    }

    /// Fail if the pattern needs a salt and none was given.
    pub(crate) fn check_salt(&self, salt: Option<&str>) -> OtpResult<()> {
        let pattern = self.patterns.get(&self.params.pattern)?;
        if pattern.requires_salt() && salt.map_or(true, str::is_empty) {
            return Err(OtpError::MissingSalt(self.params.pattern.to_string()));
        }
        Ok(())
    }

    pub(crate) fn check_length<'a>(&self, code: &'a str) -> OtpResult<&'a str> {
        let code = code.trim();
        let expected = self.params.digits.width();
        let actual = code.chars().count();
        if actual != expected {
            return Err(OtpError::LengthMismatch { expected, actual });
        }
        Ok(code)
    }

    /// Provisioning URI under `default_host`, unless the configuration or
    /// the pattern names another host.
    pub(crate) fn key_uri_with(
        &self,
        default_host: &str,
        period: Option<u64>,
    ) -> OtpResult<String> {
        let pattern = self.patterns.get(&self.params.pattern)?;
        let host = self
            .params
            .host
            .as_deref()
            .or_else(|| pattern.host())
            .unwrap_or(default_host);
        KeyUri {
            host,
            issuer: &self.params.issuer,
            account_name: &self.params.account_name,
            secret: self.params.secret.encoded(),
            algorithm: self.params.algorithm,
            digits: self.params.digits,
            period,
        }
        .build()
    }
}

impl OneTimePassword for Hotp {
    fn generate_code(&self, input: &GenerationInput) -> OtpResult<Vec<String>> {
        let counter = input.counter().ok_or(OtpError::MissingCounter)?;
        self.check_salt(input.salt())?;
        Ok(vec![self.generate_for_counter(counter, input.salt())?])
    }

    fn validate(&self, code: &str, input: &GenerationInput) -> OtpResult<bool> {
        let counter = input.counter().ok_or(OtpError::MissingCounter)?;
        self.validate_for_counter(code, counter, input.salt())
    }

    fn key_uri(&self) -> OtpResult<String> {
        self.key_uri_with("hotp", None)
    }
}
