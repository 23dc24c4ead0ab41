//! Shared-secret handling.
//!
//! A [`Secret`] always carries both forms of the key: the raw bytes, which
//! are authoritative and fed to the HMAC, and the unpadded Base32 string
//! published to authenticator apps. Both are fixed at construction.

use std::fmt;
use std::sync::OnceLock;

use data_encoding::{Encoding, BASE32, BASE32_NOPAD};
use rand::{rngs::OsRng, CryptoRng, RngCore};

use crate::{OtpError, OtpResult};

/// RFC 4648 Base32 that ignores non-zero bits left over in the final symbol,
/// as secrets from some issuers carry them.
fn lenient_base32() -> &'static Encoding {
    static LENIENT: OnceLock<Encoding> = OnceLock::new();
    LENIENT.get_or_init(|| {
        let mut spec = BASE32.specification();
        spec.check_trailing_bits = false;
        spec.encoding().unwrap_or_else(|_| BASE32.clone())
    })
}

/// Size of a randomly generated secret when none is configured (160 bits,
/// as recommended by RFC 4226).
pub const DEFAULT_SECRET_SIZE: usize = 20;

#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    raw: Vec<u8>,
    encoded: String,
}

impl Secret {
    /// Use `raw` as the secret as-is.
    pub fn from_bytes(raw: impl Into<Vec<u8>>) -> OtpResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(OtpError::EmptySecret);
        }
        let encoded = BASE32_NOPAD.encode(&raw);
        Ok(Secret { raw, encoded })
    }

    /// Decode a Base32 secret as typed by a user or read from a QR code.
    ///
    /// Input is case-insensitive, surrounding whitespace is ignored and
    /// missing `=` padding is restored before decoding. Unused trailing bits
    /// are dropped, so the stored encoding may differ from `encoded`.
    pub fn from_encoded(encoded: &str) -> OtpResult<Self> {
        let mut normalized = encoded.trim().to_ascii_uppercase();
        let rem = normalized.len() % 8;
        if rem != 0 {
            normalized.extend(std::iter::repeat('=').take(8 - rem));
        }
        let raw = lenient_base32().decode(normalized.as_bytes())?;
        Self::from_bytes(raw)
    }

    /// Draw `size` bytes from the operating system's CSPRNG.
    pub fn generate(size: usize) -> OtpResult<Self> {
        Self::generate_with(&mut OsRng, size)
    }

    /// Draw `size` bytes from `rng`.
    pub fn generate_with<R>(rng: &mut R, size: usize) -> OtpResult<Self>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        if size == 0 {
            return Err(OtpError::InvalidSecretSize);
        }
        let mut raw = vec![0u8; size];
        rng.try_fill_bytes(&mut raw)?;
        tracing::debug!(size, "generated random secret");
        Self::from_bytes(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The unpadded Base32 form.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Always `false`; a secret is never empty.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.raw.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use rand::{CryptoRng, RngCore};
    use test_case::test_case;

    use super::Secret;
    use crate::OtpError;

    #[test]
    fn it_encodes_raw_secrets_without_padding() {
        let secret = Secret::from_bytes(b"dhlanshan".to_vec()).unwrap();
        assert_eq!(secret.encoded(), "MRUGYYLOONUGC3Q");
        assert_eq!(secret.as_bytes(), b"dhlanshan");
    }

    #[test_case("MRUGYYLOONUGC3Q")]
    #[test_case("mrugyyloonugc3q")]
    #[test_case("  MRUGYYLOONUGC3Q=\n")]
    fn it_decodes_lenient_base32(encoded: &str) {
        let secret = Secret::from_encoded(encoded).unwrap();
        assert_eq!(secret.as_bytes(), b"dhlanshan");
        assert_eq!(secret.encoded(), "MRUGYYLOONUGC3Q");
    }

    #[test]
    fn it_ignores_trailing_bits() {
        // Q and R differ only in the bits past the last full byte
        let secret = Secret::from_encoded("MRUGYYLOONUGC3R").unwrap();
        assert_eq!(secret.as_bytes(), b"dhlanshan");
        assert_eq!(secret.encoded(), "MRUGYYLOONUGC3Q");
    }

    #[test_case("MRUGYYLOONUGC3Q1")]
    #[test_case("not base32!")]
    fn it_rejects_invalid_base32(encoded: &str) {
        assert!(matches!(Secret::from_encoded(encoded), Err(OtpError::Decode(_))));
    }

    #[test]
    fn it_rejects_empty_secrets() {
        assert!(matches!(Secret::from_bytes(Vec::new()), Err(OtpError::EmptySecret)));
        assert!(matches!(Secret::from_encoded("   "), Err(OtpError::EmptySecret)));
    }

    #[test]
    fn it_generates_secrets_of_the_requested_size() {
        let secret = Secret::generate(32).unwrap();
        assert_eq!(secret.len(), 32);
        let decoded = Secret::from_encoded(secret.encoded()).unwrap();
        assert_eq!(decoded, secret);
    }

    #[test]
    fn it_rejects_zero_sized_generation() {
        assert!(matches!(Secret::generate(0), Err(OtpError::InvalidSecretSize)));
    }

    struct Exhausted;

    impl RngCore for Exhausted {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("entropy source exhausted"))
        }
    }

    impl CryptoRng for Exhausted {}

    #[test]
    fn it_reports_entropy_failures() {
        let result = Secret::generate_with(&mut Exhausted, 20);
        assert!(matches!(result, Err(OtpError::Entropy(_))));
    }

    #[test]
    fn it_does_not_leak_secret_bytes_in_debug() {
        let secret = Secret::from_bytes(b"dhlanshan".to_vec()).unwrap();
        let debug = format!("{secret:?}");
        assert!(!debug.contains("dhlanshan"));
        assert!(!debug.contains("MRUGYYLOONUGC3Q"));
    }
}
