use std::fmt;
use std::sync::Arc;

use unix_time::Instant;

use crate::config::OtpParams;
use crate::hotp::Hotp;
use crate::pattern::PatternRegistry;
use crate::{GenerationInput, OneTimePassword, OtpError, OtpResult};

/// Time-based one-time passcode.
///
/// Provides one-time passcodes that are valid within a window
/// of time after the passcode is generated. Each time step is handed to a
/// [`Hotp`] engine as its counter.
#[derive(Clone, Debug)]
pub struct Totp {
    hotp: Hotp,
    time: Time,
}

impl Totp {
    /// Get a TOTP generator.
    ///
    /// Repeated calls to [`OneTimePassword::generate_code`] return the same
    /// passcodes while in the same `period`. Validation accepts codes up to
    /// `skew` periods either side of now.
    pub fn new(
        params: OtpParams,
        period: u64,
        skew: u64,
        patterns: Arc<PatternRegistry>,
    ) -> OtpResult<Self> {
        Totp::new_with_now(params, period, skew, patterns, Arc::new(Instant::now))
    }

    /// Get a TOTP generator with a custom function to provide the
    /// "now" value.
    ///
    /// See [`Self::new`].
    pub fn new_with_now(
        params: OtpParams,
        period: u64,
        skew: u64,
        patterns: Arc<PatternRegistry>,
        now: Arc<dyn Fn() -> Instant + Send + Sync>,
    ) -> OtpResult<Self> {
        if period == 0 {
            return Err(OtpError::InvalidPeriod);
        }
        let period = match patterns.get(&params.pattern)?.forced_parameters() {
            Some(forced) if forced.period != period => {
                tracing::debug!(
                    pattern = %params.pattern,
                    period = forced.period,
                    "pattern overrides configured period"
                );
                forced.period
            }
            _ => period,
        };
        let hotp = Hotp::new(params, patterns)?;
        Ok(Totp {
            hotp,
            time: Time { period, skew, now },
        })
    }

    pub fn hotp(&self) -> &Hotp {
        &self.hotp
    }

    pub fn period(&self) -> u64 {
        self.time.period
    }

    pub fn skew(&self) -> u64 {
        self.time.skew
    }

    /// The time step containing "now".
    pub fn current_counter(&self) -> u64 {
        self.time.counter()
    }

    fn center(&self, input: &GenerationInput) -> u64 {
        input.counter().unwrap_or_else(|| self.time.counter())
    }
}

impl OneTimePassword for Totp {
    /// One code per counter in the skew window, the current step first.
    fn generate_code(&self, input: &GenerationInput) -> OtpResult<Vec<String>> {
        self.hotp.check_salt(input.salt())?;
        counter_window(self.center(input), self.time.skew)
            .map(|counter| self.hotp.generate_for_counter(counter, input.salt()))
            .collect()
    }

    fn validate(&self, code: &str, input: &GenerationInput) -> OtpResult<bool> {
        self.hotp.check_salt(input.salt())?;
        self.hotp.check_length(code)?;

        let center = self.center(input);
        for counter in counter_window(center, self.time.skew) {
            tracing::trace!(counter, "checking time step");
            if self.hotp.validate_for_counter(code, counter, input.salt())? {
                if counter != center {
                    tracing::debug!(counter, center, "accepted code from an adjacent time step");
                }
                return Ok(true);
            }
        }
        Err(OtpError::NoMatch)
    }

    fn key_uri(&self) -> OtpResult<String> {
        self.hotp.key_uri_with("totp", Some(self.time.period))
    }
}

/// Counters within `skew` steps of `center`, ordered
/// `center, center + 1, center - 1, center + 2, center - 2, ...`.
///
/// Steps that would fall outside `u64` are skipped.
pub fn counter_window(center: u64, skew: u64) -> impl Iterator<Item = u64> {
    std::iter::once(center).chain(
        (1..=skew)
            .flat_map(move |i| [center.checked_add(i), center.checked_sub(i)])
            .flatten(),
    )
}

/// Maps the clock onto time steps of `period` seconds since the Unix epoch.
#[derive(Clone)]
struct Time {
    period: u64,
    skew: u64,
    now: Arc<dyn Fn() -> Instant + Send + Sync>,
}

impl Time {
    fn counter(&self) -> u64 {
        let elapsed = (self.now)() - Instant::at(0, 0);
        elapsed.as_secs() / self.period
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Time")
            .field("period", &self.period)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use test_case::test_case;
    use unix_time::Instant;

    use super::{counter_window, Totp};
    use crate::pattern::{PatternRegistry, PatternTag};
    use crate::{Algorithm, Digits, GenerationInput, OneTimePassword, OtpError, OtpParams, Secret};

    fn totp_at(params: OtpParams, period: u64, skew: u64, secs: u64) -> Totp {
        Totp::new_with_now(
            params,
            period,
            skew,
            PatternRegistry::builtin(),
            Arc::new(move || Instant::at(secs, 0)),
        )
        .unwrap()
    }

    fn dhlanshan() -> OtpParams {
        OtpParams::new(Secret::from_bytes(b"dhlanshan".to_vec()).unwrap())
    }

    // These test cases are copied from RFC 6238
    // https://datatracker.ietf.org/doc/html/rfc6238#appendix-B
    #[test_case(59, "94287082", "46119246", "90693936")]
    #[test_case(1111111109, "07081804", "68084774", "25091201")]
    #[test_case(1111111111, "14050471", "67062674", "99943326")]
    #[test_case(1234567890, "89005924", "91819424", "93441116")]
    #[test_case(2000000000, "69279037", "90698825", "38618901")]
    #[test_case(20000000000, "65353130", "77737706", "47863826")]
    fn it_computes_correct_totp(secs: u64, sha1: &str, sha256: &str, sha512: &str) {
        let cases = [
            (Algorithm::Sha1, &b"12345678901234567890"[..], sha1),
            (Algorithm::Sha256, &b"12345678901234567890123456789012"[..], sha256),
            (
                Algorithm::Sha512,
                &b"1234567890123456789012345678901234567890123456789012345678901234"[..],
                sha512,
            ),
        ];
        for (algorithm, key, expected) in cases {
            let params = OtpParams::new(Secret::from_bytes(key).unwrap())
                .with_algorithm(algorithm)
                .with_digits(Digits::EIGHT);
            let totp = totp_at(params, 30, 0, secs);
            let codes = totp.generate_code(&GenerationInput::new()).unwrap();
            assert_eq!(codes, [expected], "{algorithm}");
        }
    }

    #[test]
    fn it_derives_the_counter_from_the_clock() {
        let totp = totp_at(dhlanshan(), 30, 0, 95);
        assert_eq!(totp.current_counter(), 3);
        assert_eq!(totp.generate_code(&GenerationInput::new()).unwrap(), ["358324"]);

        let totp = totp_at(dhlanshan(), 60, 0, 200);
        assert_eq!(totp.current_counter(), 3);
    }

    #[test]
    fn it_uses_an_explicit_counter_as_the_time_step() {
        let totp = totp_at(dhlanshan(), 30, 0, 1_700_000_000);
        let codes = totp.generate_code(&GenerationInput::at_counter(3)).unwrap();
        assert_eq!(codes, ["358324"]);
    }

    #[test]
    fn it_generates_the_whole_window() {
        let totp = totp_at(dhlanshan(), 30, 1, 95);
        let codes = totp.generate_code(&GenerationInput::new()).unwrap();
        assert_eq!(codes, ["358324", "992506", "145743"]);
    }

    #[test]
    fn it_orders_the_window_outwards_from_the_center() {
        assert_eq!(counter_window(5, 0).collect::<Vec<_>>(), [5]);
        assert_eq!(counter_window(5, 2).collect::<Vec<_>>(), [5, 6, 4, 7, 3]);
    }

    #[test]
    fn it_skips_steps_outside_the_counter_range() {
        assert_eq!(counter_window(0, 2).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(
            counter_window(u64::MAX, 1).collect::<Vec<_>>(),
            [u64::MAX, u64::MAX - 1]
        );
    }

    // dhlanshan codes for counters 0..=7
    const CODES: [&str; 8] = [
        "253416", "617297", "145743", "358324", "992506", "332793", "878301", "385890",
    ];

    #[test_case(0, 4, true)]
    #[test_case(1, 3, true)]
    #[test_case(1, 5, true)]
    #[test_case(2, 2, true)]
    #[test_case(2, 6, true)]
    #[test_case(1, 2, false)]
    #[test_case(1, 6, false)]
    #[test_case(2, 1, false)]
    #[test_case(2, 7, false)]
    fn it_validates_within_the_skew(skew: u64, counter: usize, accepted: bool) {
        let totp = totp_at(dhlanshan(), 30, skew, 4 * 30 + 7);
        let result = totp.validate(CODES[counter], &GenerationInput::new());
        if accepted {
            assert!(result.unwrap());
        } else {
            assert!(matches!(result, Err(OtpError::NoMatch)));
        }
    }

    #[test]
    fn it_rejects_codes_of_the_wrong_length() {
        let totp = totp_at(dhlanshan(), 30, 1, 95);
        let err = totp.validate("3583", &GenerationInput::new()).unwrap_err();
        assert!(matches!(err, OtpError::LengthMismatch { expected: 6, actual: 4 }));
    }

    #[test]
    fn it_rejects_a_zero_period() {
        let err = Totp::new(dhlanshan(), 0, 0, PatternRegistry::builtin()).unwrap_err();
        assert!(matches!(err, OtpError::InvalidPeriod));
    }

    #[test]
    fn it_forces_steam_parameters() {
        let params = dhlanshan()
            .with_pattern(PatternTag::STEAM)
            .with_digits(Digits::EIGHT);
        let totp = totp_at(params, 60, 0, 3 * 30 + 1);
        assert_eq!(totp.period(), 30);
        assert_eq!(totp.hotp().params().digits, Digits::FIVE);
        assert_eq!(totp.generate_code(&GenerationInput::new()).unwrap(), ["2MQ3V"]);
        assert!(totp.validate("2MQ3V", &GenerationInput::new()).unwrap());
        assert!(totp.key_uri().is_err());
    }

    #[test]
    fn it_salts_mobile_codes() {
        let totp = totp_at(dhlanshan().with_pattern(PatternTag::MOBILE), 30, 1, 95);
        let input = GenerationInput::new().with_salt("6688");
        let codes = totp.generate_code(&input).unwrap();
        assert_eq!(codes, ["buT5uO", "bzfemq", "bza8Ou"]);
        assert!(totp.validate("bza8Ou", &input).unwrap());
    }

    #[test]
    fn it_requires_a_salt_for_mobile() {
        let totp = totp_at(dhlanshan().with_pattern(PatternTag::MOBILE), 30, 1, 95);
        let input = GenerationInput::new();
        assert!(matches!(totp.generate_code(&input), Err(OtpError::MissingSalt(_))));
        assert!(matches!(totp.validate("x", &input), Err(OtpError::MissingSalt(_))));
    }

    #[test]
    fn it_builds_the_provisioning_uri() {
        let totp = totp_at(dhlanshan().with_account("X", "y@example.com"), 30, 0, 0);
        assert_eq!(
            totp.key_uri().unwrap(),
            "otpauth://totp/X:y%40example.com?algorithm=SHA1&digits=6&issuer=X&period=30&secret=MRUGYYLOONUGC3Q"
        );
    }

    #[test]
    fn it_uses_the_steam_host() {
        let params = dhlanshan()
            .with_account("Steam", "alice")
            .with_pattern(PatternTag::STEAM);
        let totp = totp_at(params, 30, 0, 0);
        assert_eq!(
            totp.key_uri().unwrap(),
            "otpauth://steam/Steam:alice?algorithm=SHA1&digits=5&issuer=Steam&period=30&secret=MRUGYYLOONUGC3Q"
        );
    }
}
