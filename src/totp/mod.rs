use data_encoding::BASE32;
use ring::hmac;
use thiserror::Error;

/// Period used when the otpauth url does not carry a usable one.
pub const DEFAULT_PERIOD: u64 = 30;

/// Digits in a generated token.
pub const DEFAULT_DIGITS: u32 = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TotpError {
    #[error("secret is not valid base32: {0}")]
    InvalidSecret(String),

    #[error("secret decodes to an empty key")]
    EmptySecret,

    #[error("period must be at least one second")]
    InvalidPeriod,

    #[error("unsupported digit count {0}, expected 1 to 9")]
    InvalidDigits(u32),
}

/// HMAC used for the HOTP core.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Parse the `algorithm` parameter of an otpauth url.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA1" => Some(Algorithm::Sha1),
            "SHA256" => Some(Algorithm::Sha256),
            "SHA512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    fn hmac(self) -> hmac::Algorithm {
        match self {
            Algorithm::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Algorithm::Sha256 => hmac::HMAC_SHA256,
            Algorithm::Sha512 => hmac::HMAC_SHA512,
        }
    }
}

/// Interval number for a unix timestamp. This is the counter fed to the
/// HOTP core.
pub fn interval(period: u64, timestamp: u64) -> u64 {
    timestamp / period.max(1)
}

/// Seconds left before the token for `timestamp` expires.
pub fn remaining_seconds(period: u64, timestamp: u64) -> u64 {
    let period = period.max(1);
    period - timestamp % period
}

/// Generate the TOTP for `timestamp` (seconds since the unix epoch).
pub fn generate(
    secret: &str,
    period: u64,
    digits: u32,
    algorithm: Algorithm,
    timestamp: u64,
) -> Result<String, TotpError> {
    if period == 0 {
        return Err(TotpError::InvalidPeriod);
    }
    let key = decode_secret(secret)?;
    hotp(&key, timestamp / period, digits, algorithm)
}

/// RFC 4226 HOTP value for `counter`.
fn hotp(key: &[u8], counter: u64, digits: u32, algorithm: Algorithm) -> Result<String, TotpError> {
    if !(1..=9).contains(&digits) {
        return Err(TotpError::InvalidDigits(digits));
    }

    let key = hmac::Key::new(algorithm.hmac(), key);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let tag = tag.as_ref();

    // The offset is the low-order 4 bits of the last byte of the
    // signature, whatever the digest length.
    let offset = (tag[tag.len() - 1] & 0x0f) as usize;

    let h = u32::from_be_bytes([
        tag[offset] & 0x7f,
        tag[offset + 1],
        tag[offset + 2],
        tag[offset + 3],
    ]);

    // Format the otp with left padding if the modulo is shorter than the
    // required digits.
    Ok(format!(
        "{:0w$}",
        h % 10u32.pow(digits),
        w = digits as usize
    ))
}

/// Decode a base32 secret as found in otpauth urls, which are often
/// lowercase, spaced in groups and stripped of their `=` padding.
fn decode_secret(secret: &str) -> Result<Vec<u8>, TotpError> {
    let mut s: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    pad_string_to_base32(&mut s);

    let key = BASE32
        .decode(s.as_bytes())
        .map_err(|e| TotpError::InvalidSecret(e.to_string()))?;
    if key.is_empty() {
        return Err(TotpError::EmptySecret);
    }
    Ok(key)
}

/// Pad the secret to have the length divisible by 8 for it to be
/// decoded as base32.
fn pad_string_to_base32(s: &mut String) {
    let pad_len = (8 - s.len() % 8) % 8;
    s.extend(std::iter::repeat('=').take(pad_len));
}
