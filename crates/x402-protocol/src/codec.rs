//! Header codec: base64(JSON) for `X-PAYMENT` and `X-PAYMENT-RESPONSE`.
//!
//! Encoding uses the struct field order, so the same value always encodes
//! to the same bytes. Decoding never panics; every failure surfaces as
//! [`X402Error::MalformedPayload`].

use base64::Engine;

use crate::payment::PaymentPayload;
use crate::response::SettleResponse;
use crate::X402Error;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Encode a payment payload for the `X-PAYMENT` header.
pub fn encode_payment(payload: &PaymentPayload) -> Result<String, X402Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(B64.encode(json))
}

/// Decode and validate an `X-PAYMENT` header value.
pub fn decode_payment(encoded: &str) -> Result<PaymentPayload, X402Error> {
    let bytes = B64
        .decode(encoded.trim())
        .map_err(|e| X402Error::MalformedPayload(format!("invalid base64: {e}")))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::MalformedPayload(format!("invalid JSON: {e}")))?;
    Ok(PaymentPayload::from_value(value)?)
}

/// Encode a settlement result for the `X-PAYMENT-RESPONSE` header.
pub fn encode_settle_response(response: &SettleResponse) -> Result<String, X402Error> {
    let json = serde_json::to_vec(response)?;
    Ok(B64.encode(json))
}

/// Decode an `X-PAYMENT-RESPONSE` header value.
pub fn decode_settle_response(encoded: &str) -> Result<SettleResponse, X402Error> {
    let bytes = B64
        .decode(encoded.trim())
        .map_err(|e| X402Error::MalformedPayload(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::MalformedPayload(format!("invalid settle response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{ExactEvmAuthorization, ExactEvmPayload};
    use crate::ErrorReason;
    use alloy::primitives::{Address, Bytes, B256, U256};

    fn sample_payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: 1,
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            payload: ExactEvmPayload {
                signature: Bytes::from(vec![7u8; 65]),
                authorization: ExactEvmAuthorization {
                    from: Address::repeat_byte(0x11),
                    to: Address::repeat_byte(0x22),
                    value: U256::from(10_000u64),
                    valid_after: 1_700_000_000,
                    valid_before: 1_700_000_060,
                    nonce: B256::repeat_byte(0x33),
                },
            },
        }
    }

    #[test]
    fn test_payment_roundtrip() {
        let payload = sample_payload();
        let encoded = encode_payment(&payload).unwrap();
        assert_eq!(decode_payment(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_encoding_is_stable() {
        let payload = sample_payload();
        assert_eq!(
            encode_payment(&payload).unwrap(),
            encode_payment(&payload.clone()).unwrap()
        );
    }

    #[test]
    fn test_amounts_encode_as_decimal_strings() {
        let encoded = encode_payment(&sample_payload()).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&B64.decode(encoded).unwrap()).unwrap();
        assert_eq!(json["payload"]["authorization"]["value"], "10000");
        assert_eq!(json["payload"]["authorization"]["validBefore"], "1700000060");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let cases = [
            "not base64!!".to_string(),
            String::new(),
            B64.encode("{not json"),
            B64.encode("{}"),
        ];
        for bad in &cases {
            assert!(
                matches!(decode_payment(bad), Err(X402Error::MalformedPayload(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let mut json = serde_json::to_value(sample_payload()).unwrap();
        json["extra"] = serde_json::json!("x");
        let encoded = B64.encode(serde_json::to_vec(&json).unwrap());
        assert!(matches!(
            decode_payment(&encoded),
            Err(X402Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_settle_response_roundtrip() {
        let resp = SettleResponse::failed(
            ErrorReason::InvalidScheme,
            "0xabc".to_string(),
            "base".to_string(),
            Some(Address::repeat_byte(0x11)),
        );
        let encoded = encode_settle_response(&resp).unwrap();
        assert_eq!(decode_settle_response(&encoded).unwrap(), resp);
    }
}
