//! Shared-secret authentication between resource servers and the facilitator,
//! plus the constant-time comparison used for bearer tokens.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::X402Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const FACILITATOR_AUTH_HEADER: &str = "X-Facilitator-Auth";

fn mac(secret: &[u8], body: &[u8]) -> Result<HmacSha256, X402Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| X402Error::ConfigError(format!("invalid HMAC key: {e}")))?;
    mac.update(body);
    Ok(mac)
}

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn compute_hmac(secret: &[u8], body: &[u8]) -> Result<String, X402Error> {
    Ok(alloy::hex::encode(mac(secret, body)?.finalize().into_bytes()))
}

/// Check a hex HMAC-SHA256 signature in constant time.
///
/// Malformed hex is compared against zeros so it takes the same path as a
/// wrong signature.
pub fn verify_hmac(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let expected = alloy::hex::decode(signature.trim()).unwrap_or_else(|_| vec![0u8; 32]);
    mac(secret, body)
        .map(|mac| mac.verify_slice(&expected).is_ok())
        .unwrap_or(false)
}

/// Constant-time comparison that leaks neither content nor length.
///
/// Both inputs are hashed to fixed-length digests before comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_roundtrip() {
        let sig = compute_hmac(b"test-secret", b"request body").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_hmac(b"test-secret", b"request body", &sig));
    }

    #[test]
    fn test_hmac_wrong_secret() {
        let sig = compute_hmac(b"secret-1", b"body").unwrap();
        assert!(!verify_hmac(b"secret-2", b"body", &sig));
    }

    #[test]
    fn test_hmac_tampered_body() {
        let sig = compute_hmac(b"secret", b"original").unwrap();
        assert!(!verify_hmac(b"secret", b"tampered", &sig));
    }

    #[test]
    fn test_hmac_accepts_any_key_length() {
        let long_key = [7u8; 200];
        let sig = compute_hmac(&long_key, b"body").unwrap();
        assert!(verify_hmac(&long_key, b"body", &sig));
        let sig = compute_hmac(b"", b"body").unwrap();
        assert!(verify_hmac(b"", b"body", &sig));
    }

    #[test]
    fn test_hmac_invalid_hex() {
        assert!(!verify_hmac(b"secret", b"body", "not-hex-zz"));
        assert!(!verify_hmac(b"secret", b"body", ""));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"other"));
        assert!(!constant_time_eq(b"short", b"much longer token"));
        assert!(constant_time_eq(b"", b""));
    }
}
