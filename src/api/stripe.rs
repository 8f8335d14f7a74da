// src/api/stripe.rs
//
// Stripe-style webhook signatures: `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>]`
// where each v1 is HMAC-SHA256(secret, "<t>.<raw body>").

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::LedgerError;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// HMAC-SHA256 of `"<timestamp>.<payload>"` in hex.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// A complete header value for `payload` signed at `timestamp`.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={},v1={}", timestamp, sign_payload(secret, timestamp, payload))
}

pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), LedgerError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return Err(LedgerError::Authenticity(
            "signature header has no timestamp".to_string(),
        ));
    };
    if signatures.is_empty() {
        return Err(LedgerError::Authenticity(
            "signature header has no v1 signature".to_string(),
        ));
    }
    // t= is attacker-controlled; keep the window arithmetic overflow-free
    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(LedgerError::Authenticity(format!(
            "signature timestamp {timestamp} outside tolerance"
        )));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| LedgerError::Internal(format!("webhook secret rejected: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time
    if signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok())
    {
        Ok(())
    } else {
        Err(LedgerError::Authenticity("signature mismatch".to_string()))
    }
}
