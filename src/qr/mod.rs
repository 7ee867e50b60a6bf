use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::io::Reader;
use tracing::debug;

use crate::error::{Error, Result};

const OTPAUTH_PREFIX: &str = "otpauth://";

/// extract_otpauth_uri reads the QR code in the image at `path` and returns
/// its payload, the otpauth url required to generate a TOTP. This contains
/// the secret, tick period, digits in the totp string, algorithm used to
/// create the hash for the HOTP core and the issuer as a metadata.
///
/// The first symbol that decodes is used; unreadable candidates before it
/// are skipped.
pub fn extract_otpauth_uri(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|source| Error::ImageOpen {
        path: path.to_path_buf(),
        source,
    })?;

    // Sniff the format from the content rather than trusting the extension.
    let img = Reader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;

    let decoder = bardecoder::default_decoder();
    let payload = first_payload(decoder.decode(&img))?;
    debug!(bytes = payload.len(), "decoded QR payload");

    if !payload.starts_with(OTPAUTH_PREFIX) {
        return Err(Error::NotOtpauth);
    }
    Ok(payload)
}

/// Pick the first successfully decoded candidate. The decoder reports false
/// finder pattern groupings as failed candidates, so a failure only counts
/// when nothing decoded at all.
fn first_payload<E: std::fmt::Display>(
    candidates: Vec<std::result::Result<String, E>>,
) -> Result<String> {
    let mut last_error = None;
    for candidate in candidates {
        match candidate {
            Ok(payload) => return Ok(payload),
            Err(e) => {
                debug!("skipping unreadable QR candidate: {}", e);
                last_error = Some(e.to_string());
            }
        }
    }
    Err(last_error.map_or(Error::NoQrCode, Error::QrRecognition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};
    use ::qrcode::{Color, EcLevel, QrCode};
    use tempfile::TempDir;

    const SCALE: u32 = 8;
    const QUIET_ZONE: u32 = 4;

    /// Module colors of `data`, with everything outside the three finder
    /// patterns inverted when `scramble` is set.
    fn modules(data: &str, scramble: bool) -> (u32, Vec<bool>) {
        let code = QrCode::with_error_correction_level(data, EcLevel::L).unwrap();
        let width = code.width() as u32;
        let dark = code
            .to_colors()
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let (x, y) = (i as u32 % width, i as u32 / width);
                let finder = (x < 8 || x >= width - 8) && (y < 8 || y >= width - 8)
                    && !(x >= width - 8 && y >= width - 8);
                (c == Color::Dark) != (scramble && !finder)
            })
            .collect();
        (width, dark)
    }

    /// Render symbols side by side as a PNG in `dir`.
    fn write_symbols_png(
        dir: &TempDir,
        name: &str,
        symbols: &[(&str, bool)],
    ) -> std::path::PathBuf {
        let rendered: Vec<_> = symbols.iter().map(|(d, s)| modules(d, *s)).collect();
        let cell = rendered.iter().map(|(w, _)| w + 2 * QUIET_ZONE).max().unwrap_or(0);
        let img = GrayImage::from_fn(cell * SCALE * rendered.len() as u32, cell * SCALE, |x, y| {
            let (width, dark) = &rendered[(x / SCALE / cell) as usize];
            let mx = (x / SCALE % cell) as i64 - QUIET_ZONE as i64;
            let my = (y / SCALE) as i64 - QUIET_ZONE as i64;
            let inside = (0..*width as i64).contains(&mx) && (0..*width as i64).contains(&my);
            if inside && dark[(my as u32 * width + mx as u32) as usize] {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        });

        let path = dir.path().join(name);
        DynamicImage::ImageLuma8(img).save(&path).unwrap();
        path
    }

    /// Render `data` as a QR code PNG in `dir`.
    fn write_qr_png(dir: &TempDir, name: &str, data: &str) -> std::path::PathBuf {
        write_symbols_png(dir, name, &[(data, false)])
    }

    #[test]
    fn test_otpauth_parse_success() {
        let dir = TempDir::new().unwrap();
        let url = "otpauth://totp/otplib-website:otplib-demo-user?secret=H4ZWJCQZEREL2IE2&period=30&digits=6&algorithm=SHA1&issuer=otplib-website";
        let f = write_qr_png(&dir, "test.png", url);
        assert_eq!(extract_otpauth_uri(&f).unwrap(), url);
    }

    #[test]
    fn test_unreadable_symbol_before_valid_one() {
        let dir = TempDir::new().unwrap();
        let url = "otpauth://totp/y?secret=JBSWY3DPEHPK3PXP";
        let f = write_symbols_png(
            &dir,
            "two.png",
            &[("otpauth://totp/x?secret=MFRGGZDFMZTWQ2LK", true), (url, false)],
        );
        assert_eq!(extract_otpauth_uri(&f).unwrap(), url);
    }

    #[test]
    fn test_first_payload_skips_failed_candidates() {
        let candidates = vec![
            Err("Unable to find alignment pattern"),
            Err("Unable to find alignment pattern"),
            Ok("otpauth://totp/y?secret=JBSWY3DPEHPK3PXP".to_string()),
        ];
        assert_eq!(
            first_payload(candidates).unwrap(),
            "otpauth://totp/y?secret=JBSWY3DPEHPK3PXP"
        );
    }

    #[test]
    fn test_first_payload_failures() {
        let err = first_payload(vec![Err::<String, _>("bad ecc"), Err("bad format")]).unwrap_err();
        assert!(matches!(err, Error::QrRecognition(msg) if msg == "bad format"));

        let err = first_payload(Vec::<std::result::Result<String, &str>>::new()).unwrap_err();
        assert!(matches!(err, Error::NoQrCode));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = extract_otpauth_uri(&dir.path().join("nonexistent.png")).unwrap_err();
        assert!(matches!(err, Error::ImageOpen { .. }));
    }

    #[test]
    fn test_not_an_image() {
        let dir = TempDir::new().unwrap();
        let f = dir.path().join("garbage.png");
        std::fs::write(&f, b"garbage content").unwrap();
        let err = extract_otpauth_uri(&f).unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
    }

    #[test]
    fn test_blank_image() {
        let dir = TempDir::new().unwrap();
        let f = dir.path().join("blank.png");
        DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 200, Luma([255u8])))
            .save(&f)
            .unwrap();
        let err = extract_otpauth_uri(&f).unwrap_err();
        assert!(matches!(err, Error::NoQrCode));
    }

    #[test]
    fn test_not_otpauth() {
        let dir = TempDir::new().unwrap();
        let f = write_qr_png(&dir, "https.png", "https://example.com");
        let err = extract_otpauth_uri(&f).unwrap_err();
        assert!(matches!(err, Error::NotOtpauth));
    }

    #[test]
    fn test_payload_without_secret_is_still_returned() {
        let dir = TempDir::new().unwrap();
        let url = "otpauth://totp/TestIssuer:tester@example.com?issuer=TestIssuer";
        let f = write_qr_png(&dir, "nosecret.png", url);
        assert_eq!(extract_otpauth_uri(&f).unwrap(), url);
    }
}
