//! Error types for reading a credential and generating codes from it

use std::path::PathBuf;
use thiserror::Error;

use crate::totp::TotpError;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that stops a run. Clipboard failures are not in here: they are
/// `ClipboardError`s and only ever logged.
#[derive(Debug, Error)]
pub enum Error {
    /// Image file could not be opened
    #[error("failed to open image {path}: {source}")]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image file is not a PNG or JPEG we can decode
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// A QR symbol was located but could not be read
    #[error("failed to recognize QR code: {0}")]
    QrRecognition(String),

    #[error("no QR code found in the image")]
    NoQrCode,

    #[error("QR code does not contain an otpauth URL")]
    NotOtpauth,

    #[error("failed to parse otpauth URL: {0}")]
    UriParse(#[from] url::ParseError),

    #[error("unsupported URL scheme '{0}', expected otpauth")]
    Scheme(String),

    /// Only time based credentials can be served
    #[error("unsupported OTP type '{0}', only totp is supported")]
    UnsupportedType(String),

    #[error("no secret found in the otpauth URL")]
    MissingSecret,

    #[error("failed to generate TOTP: {0}")]
    Generation(#[from] TotpError),

    /// Terminal output could not be written
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
