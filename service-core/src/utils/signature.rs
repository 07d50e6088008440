use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Sign a webhook body: hex(HMAC-SHA256(body, secret)).
///
/// The billing provider signs event payloads the same way, so this one
/// function serves both verification of inbound webhooks and tests.
pub fn sign_body(secret: &str, body: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(body.as_bytes());
    let result = mac.finalize();
    Ok(hex::encode(result.into_bytes()))
}

/// Verify a webhook body signature using constant-time comparison.
pub fn verify_body(secret: &str, body: &str, signature: &str) -> Result<bool, anyhow::Error> {
    let expected = sign_body(secret, body)?;

    let expected_bytes = expected.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let secret = "whsec_test_key";
        let body = r#"{"event":"subscription.updated"}"#;

        let signature = sign_body(secret, body).unwrap();
        assert!(!signature.is_empty());

        assert!(verify_body(secret, body, &signature).unwrap());
    }

    #[test]
    fn test_rejects_altered_signature() {
        let secret = "whsec_test_key";
        let body = r#"{"event":"subscription.updated"}"#;

        let signature = sign_body(secret, body).unwrap();
        let altered = format!("a{}", &signature[1..]);

        assert!(!verify_body(secret, body, &altered).unwrap());
    }

    #[test]
    fn test_rejects_tampered_body() {
        let secret = "whsec_test_key";
        let body = r#"{"event":"subscription.updated"}"#;
        let signature = sign_body(secret, body).unwrap();

        let tampered = r#"{"event":"subscription.deleted"}"#;
        assert!(!verify_body(secret, tampered, &signature).unwrap());
    }

    #[test]
    fn test_rejects_wrong_length() {
        let secret = "whsec_test_key";
        let body = "{}";
        assert!(!verify_body(secret, body, "deadbeef").unwrap());
    }
}
