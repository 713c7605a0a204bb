//! HMAC-SHA256 signatures on approval callbacks.
//!
//! The workflow engine signs the raw request body with the shared callback
//! secret and sends `sha256=<hex>` (or bare hex) in `x-azops-signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-azops-signature";

pub fn sign(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!("sha256={}", encode_hex(mac.finalize().into_bytes().as_slice())))
}

/// Constant-time check of `header` against the body's expected signature.
pub fn verify(secret: &[u8], body: &[u8], header: &str) -> bool {
    let hex = header.trim();
    let hex = hex.strip_prefix("sha256=").unwrap_or(hex);
    let Some(expected) = decode_hex(hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 || !value.is_ascii() {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&value[index..index + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{sign, verify};

    const SECRET: &[u8] = b"callback-secret";
    const BODY: &[u8] = br#"{"requestId":"x","selectedOption":"Approve"}"#;

    #[test]
    fn signature_round_trips_with_and_without_prefix() {
        let header = sign(SECRET, BODY).expect("hmac accepts any key length");
        assert!(header.starts_with("sha256="));
        assert!(verify(SECRET, BODY, &header));
        assert!(verify(SECRET, BODY, header.trim_start_matches("sha256=")));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let header = sign(SECRET, BODY).expect("signature");
        assert!(!verify(SECRET, br#"{"requestId":"x","selectedOption":"Reject"}"#, &header));
        assert!(!verify(b"other-secret", BODY, &header));
        assert!(!verify(SECRET, BODY, "sha256=zz"));
        assert!(!verify(SECRET, BODY, ""));
    }
}
