use percent_encoding::percent_decode_str;
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::totp::{self, Algorithm, DEFAULT_DIGITS, DEFAULT_PERIOD};

const SCHEME: &str = "otpauth";
const TOTP_TYPE: &str = "totp";

/// Everything needed to generate and display codes for one account, as
/// carried by an otpauth url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub secret: String,
    pub period: u64,
    pub digits: u32,
    pub algorithm: Algorithm,
    pub issuer: String,
    pub label: String,
}

impl Credential {
    /// Token valid at `timestamp` (seconds since the unix epoch).
    pub fn code_at(&self, timestamp: u64) -> std::result::Result<String, totp::TotpError> {
        totp::generate(
            &self.secret,
            self.period,
            self.digits,
            self.algorithm,
            timestamp,
        )
    }

    /// Display name for the account: the issuer, followed by the label in
    /// parentheses when it says something the issuer doesn't.
    pub fn provider(&self) -> String {
        if !self.issuer.is_empty()
            && !self.label.is_empty()
            && self.issuer.to_lowercase() != self.label.to_lowercase()
        {
            format!("{} ({})", self.issuer, self.label)
        } else {
            self.issuer.clone()
        }
    }
}

/// Parse an otpauth url into a credential.
///
/// Sample url
/// otpauth://totp/otplib-website:otplib-demo-user?
/// secret=H4ZWJCQZEREL2IE2&period=30&digits=6
/// &algorithm=SHA1&issuer=otplib-website
///
/// Digits and algorithm are pinned to 6 and SHA1 whatever the url says.
pub fn parse(raw: &str) -> Result<Credential> {
    let u = Url::parse(raw)?;
    if u.scheme() != SCHEME {
        return Err(Error::Scheme(u.scheme().to_string()));
    }
    if let Some(kind) = u.host_str() {
        if !kind.eq_ignore_ascii_case(TOTP_TYPE) {
            return Err(Error::UnsupportedType(kind.to_string()));
        }
    }

    let secret = query_param(&u, "secret")
        .filter(|s| !s.is_empty())
        .ok_or(Error::MissingSecret)?;

    let (issuer, label) = issuer_and_label(&u);
    warn_on_pinned_params(&u);

    Ok(Credential {
        secret,
        period: period(&u),
        digits: DEFAULT_DIGITS,
        algorithm: Algorithm::Sha1,
        issuer,
        label,
    })
}

/// First value of a query parameter, already percent decoded.
fn query_param(u: &Url, key: &str) -> Option<String> {
    u.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// A missing, malformed or non-positive period falls back to the default.
fn period(u: &Url) -> u64 {
    query_param(u, "period")
        .and_then(|p| p.trim().parse::<i64>().ok())
        .filter(|p| *p > 0)
        .map_or(DEFAULT_PERIOD, |p| p as u64)
}

/// Codes are always 6 digit SHA1. Say so when the url asks for something
/// else, since the codes will then not match the server.
fn warn_on_pinned_params(u: &Url) {
    if let Some(name) = query_param(u, "algorithm") {
        match Algorithm::from_name(&name) {
            Some(Algorithm::Sha1) => {}
            Some(other) => warn!("URL asks for {:?}, generating SHA1 codes instead", other),
            None => warn!("unknown algorithm '{}', generating SHA1 codes", name),
        }
    }
    if let Some(digits) = query_param(u, "digits") {
        if digits.trim().parse::<u32>().ok() != Some(DEFAULT_DIGITS) {
            warn!("URL asks for {} digits, generating {}", digits, DEFAULT_DIGITS);
        }
    }
}

/// The path is `issuer:label` or just `label`. An explicit issuer parameter
/// replaces the path prefix as issuer but never changes how the label is cut.
fn issuer_and_label(u: &Url) -> (String, String) {
    let raw_path = u.path();
    let raw_path = raw_path.strip_prefix('/').unwrap_or(raw_path);
    let path = percent_decode_str(raw_path).decode_utf8_lossy();

    let split = path.split_once(':');

    let issuer = match query_param(u, "issuer").filter(|i| !i.is_empty()) {
        Some(issuer) => issuer,
        None => split.map_or(&*path, |(prefix, _)| prefix).to_string(),
    };

    let label = split
        .map_or(&*path, |(_, suffix)| suffix)
        .trim()
        .to_string();

    (issuer, label)
}
