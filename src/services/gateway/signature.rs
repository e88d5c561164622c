use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no matching signature")]
    Mismatch,
}

fn compute(secret: &str, timestamp: i64, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(format!("{:x}", mac.finalize().into_bytes()))
}

/// Produces a `t=<unix>,v1=<hex>` header for `payload`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let v1 = compute(secret, timestamp, payload).unwrap_or_default();
    format!("t={timestamp},v1={v1}")
}

/// Checks a `t=<unix>,v1=<hex>[,v1=...]` header. Any matching `v1` passes.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = vec![];
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    let expected = compute(secret, timestamp, payload).ok_or(SignatureError::Mismatch)?;
    if candidates
        .iter()
        .any(|c| constant_time_eq::constant_time_eq(c.as_bytes(), expected.as_bytes()))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"type":"payment_intent.succeeded"}"#;

    #[test]
    fn test_signed_payload_verifies() {
        let header = sign_payload("whsec_test", 1_700_000_000, BODY);
        assert!(header.starts_with("t=1700000000,v1="));
        assert_eq!(
            verify_signature(BODY, &header, "whsec_test", 1_700_000_100, 300),
            Ok(())
        );
    }

    #[test]
    fn test_wrong_secret_or_body_fails() {
        let header = sign_payload("whsec_test", 1_700_000_000, BODY);
        assert_eq!(
            verify_signature(BODY, &header, "whsec_other", 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(b"{}", &header, "whsec_test", 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_any_listed_signature_may_match() {
        let good = sign_payload("whsec_test", 1_700_000_000, BODY);
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t=1700000000,v1={},v1={v1}", "0".repeat(v1.len()));
        assert_eq!(
            verify_signature(BODY, &header, "whsec_test", 1_700_000_000, 300),
            Ok(())
        );
        let truncated = format!("t=1700000000,v1={}", &v1[..v1.len() - 2]);
        assert_eq!(
            verify_signature(BODY, &truncated, "whsec_test", 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_fails() {
        let header = sign_payload("whsec_test", 1_700_000_000, BODY);
        assert_eq!(
            verify_signature(BODY, &header, "whsec_test", 1_700_000_301, 300),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_malformed_header() {
        assert_eq!(
            verify_signature(BODY, "garbage", "whsec_test", 0, 300),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(BODY, "t=1", "whsec_test", 1, 300),
            Err(SignatureError::Malformed)
        );
    }
}
