use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature format: expected sha256=<hex>")]
    Format,

    #[error("invalid signature hex: {0}")]
    Decode(String),

    #[error("signature mismatch")]
    Mismatch,
}

/// Check `signature` (`sha256=<hex>`) against HMAC-SHA256 of the raw `body`.
///
/// An empty `secret` skips verification entirely.
pub fn verify(body: &[u8], signature: &str, secret: &str) -> Result<(), SignatureError> {
    if secret.is_empty() {
        tracing::debug!("webhook secret not configured, skipping signature check");
        return Ok(());
    }

    let signature_hex = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::Format)?;

    let expected =
        hex::decode(signature_hex).map_err(|e| SignatureError::Decode(e.to_string()))?;

    let mut mac = new_mac(secret);
    mac.update(body);

    // verify_slice compares in constant time
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Compute the header value the platform would send for `body`.
#[cfg(test)]
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = new_mac(secret);
    mac.update(body);
    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    )
}

fn new_mac(secret: &str) -> HmacSha256 {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => unreachable!("HMAC-SHA256 rejected a key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn test_known_vector() {
        // Published example from GitHub's webhook validation docs
        assert_eq!(
            sign(BODY, SECRET),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_valid_signature_passes() {
        let bodies: [&[u8]; 3] = [b"", BODY, b"{\"issue\":{\"number\":1}}"];
        for body in bodies {
            for secret in ["k", SECRET, "another secret"] {
                assert_eq!(verify(body, &sign(body, secret), secret), Ok(()));
            }
        }
    }

    #[test]
    fn test_flipped_signature_byte_is_mismatch() {
        let signature = sign(BODY, SECRET);
        let hex_part = &signature[SIGNATURE_PREFIX.len()..];
        let mut raw = hex::decode(hex_part).unwrap();
        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            let tampered = format!("{}{}", SIGNATURE_PREFIX, hex::encode(&raw));
            assert_eq!(verify(BODY, &tampered, SECRET), Err(SignatureError::Mismatch));
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn test_flipped_body_byte_is_mismatch() {
        let signature = sign(BODY, SECRET);
        let mut body = BODY.to_vec();
        for i in 0..body.len() {
            body[i] ^= 0x20;
            assert_eq!(verify(&body, &signature, SECRET), Err(SignatureError::Mismatch));
            body[i] ^= 0x20;
        }
    }

    #[test]
    fn test_missing_prefix_is_format_error() {
        let signature = sign(BODY, SECRET);
        let bare = signature.trim_start_matches(SIGNATURE_PREFIX);
        assert_eq!(verify(BODY, bare, SECRET), Err(SignatureError::Format));
        assert_eq!(verify(b"", "", SECRET), Err(SignatureError::Format));
        assert_eq!(
            verify(BODY, &format!("sha1={}", bare), SECRET),
            Err(SignatureError::Format)
        );
        assert_eq!(
            verify(BODY, &format!("SHA256={}", bare), SECRET),
            Err(SignatureError::Format)
        );
    }

    #[test]
    fn test_bad_hex_is_decode_error() {
        let result = verify(BODY, "sha256=not-hex!", SECRET);
        assert!(matches!(result, Err(SignatureError::Decode(_))));
    }

    #[test]
    fn test_wrong_length_digest_is_mismatch() {
        assert_eq!(verify(BODY, "sha256=abcd", SECRET), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_empty_secret_skips_verification() {
        assert_eq!(verify(BODY, "", ""), Ok(()));
        assert_eq!(verify(BODY, "garbage", ""), Ok(()));
    }
}
