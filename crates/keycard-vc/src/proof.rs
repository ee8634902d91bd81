//! Cryptographic proof verification.
//!
//! "I could read it" and "I cryptographically trust it" are different facts
//! and stay separate here: a token that parses has `valid = true` with its
//! claims populated, while `signature_verified` reports whether the EdDSA
//! signature actually checked out against the issuer's resolved key. An
//! unsupported algorithm or an unresolvable issuer leaves the credential
//! decodable-but-unverified rather than failing the whole operation.

use ed25519_dalek::{Signature, Verifier};
use serde_json::Value;
use tracing::{debug, warn};

use crate::didkey;
use crate::jose;

/// The signature algorithm this verifier checks.
pub const EDDSA_ALG: &str = "EdDSA";

/// Outcome of proof verification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationResult {
    /// The token parsed and its claims are populated.
    pub valid: bool,
    /// The signature verified against the issuer's resolved key.
    pub signature_verified: bool,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    /// Full decoded claims payload.
    pub claims: Option<Value>,
    /// The nested `vc` claims object, when present.
    pub vc_claims: Option<Value>,
    pub error: Option<String>,
}

/// Verify a credential token's signature and decode its claims.
pub fn verify_proof(token: &str) -> VerificationResult {
    let token = token.trim();
    let parts = match jose::parse(token) {
        Ok(parts) => parts,
        Err(err) => {
            return VerificationResult {
                valid: false,
                error: Some(err.to_string()),
                ..VerificationResult::default()
            }
        }
    };

    let issuer = parts
        .claims
        .get("iss")
        .and_then(Value::as_str)
        .map(str::to_string);
    let subject = parts
        .claims
        .get("sub")
        .and_then(Value::as_str)
        .map(str::to_string);
    let vc_claims = parts.claims.get("vc").cloned();

    let signature_verified = if parts.header.alg == EDDSA_ALG {
        verify_eddsa(&parts, issuer.as_deref())
    } else {
        warn!(alg = %parts.header.alg, "unsupported signature algorithm, leaving credential unverified");
        false
    };

    debug!(
        issuer = issuer.as_deref().unwrap_or("<none>"),
        signature_verified, "credential decoded"
    );

    VerificationResult {
        valid: true,
        signature_verified,
        issuer,
        subject,
        claims: Some(parts.claims),
        vc_claims,
        error: None,
    }
}

fn verify_eddsa(parts: &jose::Parts<'_>, issuer: Option<&str>) -> bool {
    let Some(issuer) = issuer else {
        warn!("no issuer claim, cannot resolve a verification key");
        return false;
    };
    let key = match didkey::resolve_ed25519(issuer) {
        Ok(key) => key,
        Err(err) => {
            debug!(error = %err, issuer, "issuer key resolution failed, leaving credential unverified");
            return false;
        }
    };
    let signature = match Signature::from_slice(&parts.signature) {
        Ok(signature) => signature,
        Err(err) => {
            warn!(error = %err, "signature bytes are not a valid Ed25519 signature");
            return false;
        }
    };
    match key.verify(parts.signing_input.as_bytes(), &signature) {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, issuer, "signature verification failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use ed25519_dalek::{Signer, SigningKey};
    use serde_json::json;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[42u8; 32])
    }

    fn sign_token(header: &Value, claims: &Value, key: &SigningKey) -> String {
        let h = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
        let p = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let signing_input = format!("{h}.{p}");
        let signature = key.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }

    fn issued_token(key: &SigningKey) -> String {
        let issuer = didkey::encode_ed25519(&key.verifying_key());
        let claims = json!({
            "iss": issuer,
            "sub": "did:example:holder",
            "vc": {
                "type": ["VerifiableCredential"],
                "credentialSubject": { "name": "Alice" }
            }
        });
        sign_token(&json!({"alg": "EdDSA", "typ": "JWT"}), &claims, key)
    }

    #[test]
    fn test_verifies_did_key_issued_token() {
        let key = signing_key();
        let result = verify_proof(&issued_token(&key));

        assert!(result.valid);
        assert!(result.signature_verified);
        assert_eq!(
            result.issuer.as_deref(),
            Some(didkey::encode_ed25519(&key.verifying_key()).as_str())
        );
        assert_eq!(result.subject.as_deref(), Some("did:example:holder"));
        assert_eq!(
            result.vc_claims.unwrap()["credentialSubject"]["name"],
            "Alice"
        );
    }

    #[test]
    fn test_tampered_claims_fail_verification_but_decode() {
        let key = signing_key();
        let token = issued_token(&key);

        // Swap the payload for different claims, keeping the signature.
        let issuer = didkey::encode_ed25519(&key.verifying_key());
        let forged_claims = json!({"iss": issuer, "sub": "did:example:mallory"});
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let mut segments: Vec<&str> = token.split('.').collect();
        segments[1] = &forged_payload;
        let forged = segments.join(".");

        let result = verify_proof(&forged);
        assert!(result.valid, "forged token still decodes");
        assert!(!result.signature_verified, "but it is not trusted");
        assert_eq!(result.subject.as_deref(), Some("did:example:mallory"));
    }

    #[test]
    fn test_unsupported_algorithm_is_decodable_but_unverified() {
        let claims = json!({"iss": "did:example:issuer", "sub": "s", "vc": {"k": 1}});
        let token = sign_token(&json!({"alg": "ES256"}), &claims, &signing_key());

        let result = verify_proof(&token);
        assert!(result.valid);
        assert!(!result.signature_verified);
        assert_eq!(result.issuer.as_deref(), Some("did:example:issuer"));
        assert!(result.claims.is_some());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_unresolvable_issuer_is_decodable_but_unverified() {
        let key = signing_key();
        let claims = json!({"iss": "did:web:example.com", "sub": "s"});
        let token = sign_token(&json!({"alg": "EdDSA"}), &claims, &key);

        let result = verify_proof(&token);
        assert!(result.valid);
        assert!(!result.signature_verified);
    }

    #[test]
    fn test_missing_issuer_is_decodable_but_unverified() {
        let token = sign_token(
            &json!({"alg": "EdDSA"}),
            &json!({"sub": "s"}),
            &signing_key(),
        );
        let result = verify_proof(&token);
        assert!(result.valid);
        assert!(!result.signature_verified);
        assert_eq!(result.issuer, None);
    }

    #[test]
    fn test_unparseable_token_is_invalid() {
        let result = verify_proof("definitely not a token");
        assert!(!result.valid);
        assert!(!result.signature_verified);
        assert!(result.error.is_some());
        assert!(result.claims.is_none());
    }
}
