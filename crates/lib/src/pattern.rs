//! Output patterns.
//!
//! A [`Pattern`] shapes a passcode at both ends of the HMAC: it may rewrite
//! the 8-byte counter before it is signed, and it maps the 31-bit truncated
//! value to the visible code. Engines look patterns up by [`PatternTag`] in
//! a [`PatternRegistry`] that is built once and then shared read-only.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, Digits};
use crate::{OtpError, OtpResult};

const STEAM_ALPHABET: &[u8; 26] = b"23456789BCDFGHJKMNPQRTVWXY";
const MOBILE_ALPHABET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Name under which a [`Pattern`] is registered.
///
/// Tags built from strings are lower-cased, so `"Steam"` and `"steam"`
/// name the same pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PatternTag(Cow<'static, str>);

impl PatternTag {
    pub const STANDARD: PatternTag = PatternTag(Cow::Borrowed("standard"));
    pub const STEAM: PatternTag = PatternTag(Cow::Borrowed("steam"));
    pub const MOBILE: PatternTag = PatternTag(Cow::Borrowed("mobile"));

    pub fn new(tag: &str) -> Self {
        PatternTag::from(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PatternTag {
    fn default() -> Self {
        PatternTag::STANDARD
    }
}

impl fmt::Display for PatternTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatternTag {
    fn from(tag: &str) -> Self {
        PatternTag(Cow::Owned(tag.trim().to_ascii_lowercase()))
    }
}

impl From<String> for PatternTag {
    fn from(tag: String) -> Self {
        PatternTag::from(tag.as_str())
    }
}

impl From<PatternTag> for String {
    fn from(tag: PatternTag) -> Self {
        tag.0.into_owned()
    }
}

/// Parameters a pattern imposes on every engine that uses it, regardless
/// of what the caller configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForcedParameters {
    pub digits: Digits,
    pub algorithm: Algorithm,
    /// Applies to TOTP engines only.
    pub period: u64,
}

pub trait Pattern: Send + Sync {
    /// Rewrite the big-endian counter before it is signed.
    fn transform_counter(&self, counter: [u8; 8], salt: Option<&str>) -> OtpResult<Vec<u8>>;

    /// Map the truncated 31-bit value to a code of exactly `digits` symbols.
    fn encode(&self, value: u32, digits: Digits) -> String;

    /// Whether a non-empty salt must accompany every generation and validation.
    fn requires_salt(&self) -> bool {
        false
    }

    fn forced_parameters(&self) -> Option<ForcedParameters> {
        None
    }

    /// Host segment of the provisioning URI, if the pattern has its own.
    fn host(&self) -> Option<&str> {
        None
    }
}

/// RFC 4226 decimal codes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Standard;

impl Pattern for Standard {
    fn transform_counter(&self, counter: [u8; 8], _salt: Option<&str>) -> OtpResult<Vec<u8>> {
        Ok(counter.to_vec())
    }

    fn encode(&self, value: u32, digits: Digits) -> String {
        let value = u64::from(value);
        let code = match 10_u64.checked_pow(u32::from(digits.get())) {
            Some(modulus) => value % modulus,
            None => value,
        };
        let width = digits.width();
        format!("{code:0>width$}")
    }
}

/// Steam Guard codes: five symbols from a 26-letter alphabet, least
/// significant symbol first.
#[derive(Clone, Copy, Debug, Default)]
pub struct Steam;

impl Pattern for Steam {
    fn transform_counter(&self, counter: [u8; 8], _salt: Option<&str>) -> OtpResult<Vec<u8>> {
        Ok(counter.to_vec())
    }

    fn encode(&self, value: u32, digits: Digits) -> String {
        symbols(value, digits, STEAM_ALPHABET).collect()
    }

    fn forced_parameters(&self) -> Option<ForcedParameters> {
        Some(ForcedParameters {
            digits: Digits::FIVE,
            algorithm: Algorithm::Sha1,
            period: 30,
        })
    }

    fn host(&self) -> Option<&str> {
        Some("steam")
    }
}

/// PIN-salted codes: the PIN is prepended to the counter before signing,
/// and the code is written in base 62, most significant symbol first.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mobile;

impl Pattern for Mobile {
    fn transform_counter(&self, counter: [u8; 8], salt: Option<&str>) -> OtpResult<Vec<u8>> {
        let salt = salt
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OtpError::MissingSalt(PatternTag::MOBILE.to_string()))?;
        let mut buf = Vec::with_capacity(salt.len() + counter.len());
        buf.extend_from_slice(salt.as_bytes());
        buf.extend_from_slice(&counter);
        Ok(buf)
    }

    fn encode(&self, value: u32, digits: Digits) -> String {
        let mut code: Vec<char> = symbols(value, digits, MOBILE_ALPHABET).collect();
        code.reverse();
        code.into_iter().collect()
    }

    fn requires_salt(&self) -> bool {
        true
    }
}

/// Repeatedly divide `value` by the alphabet size, yielding the symbol for
/// each remainder in extraction order.
fn symbols(mut value: u32, digits: Digits, alphabet: &'static [u8]) -> impl Iterator<Item = char> {
    let base = alphabet.len() as u32;
    (0..digits.width()).map(move |_| {
        let symbol = alphabet[(value % base) as usize];
        value /= base;
        char::from(symbol)
    })
}

/// Lookup table from [`PatternTag`] to strategy.
///
/// Populate it before sharing: registration takes `&mut self`, so once the
/// registry sits behind an `Arc` it can no longer change.
#[derive(Clone)]
pub struct PatternRegistry {
    patterns: HashMap<PatternTag, Arc<dyn Pattern>>,
}

impl PatternRegistry {
    /// A registry holding the standard, Steam and mobile patterns.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(PatternTag::STANDARD, Standard);
        registry.register(PatternTag::STEAM, Steam);
        registry.register(PatternTag::MOBILE, Mobile);
        registry
    }

    pub fn empty() -> Self {
        PatternRegistry {
            patterns: HashMap::new(),
        }
    }

    /// Process-wide registry of the built-in patterns.
    pub fn builtin() -> Arc<PatternRegistry> {
        static BUILTIN: OnceLock<Arc<PatternRegistry>> = OnceLock::new();
        Arc::clone(BUILTIN.get_or_init(|| Arc::new(PatternRegistry::new())))
    }

    /// Register `pattern` under `tag`, returning the strategy it replaced.
    pub fn register<P>(
        &mut self,
        tag: impl Into<PatternTag>,
        pattern: P,
    ) -> Option<Arc<dyn Pattern>>
    where
        P: Pattern + 'static,
    {
        self.patterns.insert(tag.into(), Arc::new(pattern))
    }

    pub fn get(&self, tag: &PatternTag) -> OtpResult<&Arc<dyn Pattern>> {
        self.patterns
            .get(tag)
            .ok_or_else(|| OtpError::UnknownPattern(tag.to_string()))
    }

    pub fn contains(&self, tag: &PatternTag) -> bool {
        self.patterns.contains_key(tag)
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.patterns.keys().map(PatternTag::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("PatternRegistry").field("tags", &tags).finish()
    }
}
