//! `did:key` resolution for Ed25519 issuer keys.
//!
//! A `did:key` identifier embeds the public key itself: a base58btc
//! multibase string (leading `z`) over a multicodec-prefixed key. Only the
//! Ed25519 multicodec (0xED 0x01) is resolvable here.

use ed25519_dalek::VerifyingKey;

use crate::error::VcError;

const DID_KEY_PREFIX: &str = "did:key:";
const MULTICODEC_ED25519: [u8; 2] = [0xED, 0x01];

/// Resolve an Ed25519 verification key from a `did:key` identifier.
pub fn resolve_ed25519(did: &str) -> Result<VerifyingKey, VcError> {
    let rest = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| VcError::KeyResolution(format!("not a did:key identifier: {did}")))?;
    let multibase = rest.strip_prefix('z').ok_or_else(|| {
        VcError::KeyResolution("expected base58btc multibase (leading 'z')".to_string())
    })?;
    let decoded = bs58::decode(multibase)
        .into_vec()
        .map_err(|e| VcError::KeyResolution(format!("invalid base58: {e}")))?;
    let key_bytes = decoded
        .strip_prefix(&MULTICODEC_ED25519[..])
        .ok_or_else(|| VcError::KeyResolution("not an Ed25519 multicodec key".to_string()))?;
    let key_bytes: [u8; 32] = key_bytes.try_into().map_err(|_| {
        VcError::KeyResolution(format!(
            "expected 32 key bytes, got {}",
            decoded.len().saturating_sub(MULTICODEC_ED25519.len())
        ))
    })?;
    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| VcError::KeyResolution(format!("invalid Ed25519 key: {e}")))
}

/// Encode a verification key as a `did:key` identifier.
pub fn encode_ed25519(key: &VerifyingKey) -> String {
    let mut data = Vec::with_capacity(2 + 32);
    data.extend_from_slice(&MULTICODEC_ED25519);
    data.extend_from_slice(key.as_bytes());
    format!("{DID_KEY_PREFIX}z{}", bs58::encode(data).into_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn test_encode_resolve_round_trip() {
        let key = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        let did = encode_ed25519(&key);
        assert!(did.starts_with("did:key:z"));
        assert_eq!(resolve_ed25519(&did).unwrap(), key);
    }

    #[test]
    fn test_rejects_other_did_methods() {
        let err = resolve_ed25519("did:web:example.com").unwrap_err();
        assert!(err.to_string().contains("did:key"));
    }

    #[test]
    fn test_rejects_wrong_multibase() {
        assert!(resolve_ed25519("did:key:uABCD").is_err());
    }

    #[test]
    fn test_rejects_wrong_multicodec() {
        // secp256k1 multicodec prefix (0xE7 0x01) with 33 key bytes.
        let mut data = vec![0xE7, 0x01];
        data.extend_from_slice(&[2u8; 33]);
        let did = format!("did:key:z{}", bs58::encode(data).into_string());
        let err = resolve_ed25519(&did).unwrap_err();
        assert!(err.to_string().contains("multicodec"));
    }
}
