//! JOSE compact-serialization parsing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::error::VcError;

/// Protected header of a signed token.
#[derive(Debug, Deserialize)]
pub struct Header {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// A parsed (not yet verified) compact token.
pub struct Parts<'a> {
    pub header: Header,
    pub claims: serde_json::Value,
    /// The `header.payload` text the signature covers.
    pub signing_input: &'a str,
    pub signature: Vec<u8>,
}

/// Split and decode the three dot-separated segments. No signature check
/// happens here.
pub fn parse(token: &str) -> Result<Parts<'_>, VcError> {
    let mut segments = token.split('.');
    let (h, p, s) = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
            (h, p, s)
        }
        _ => {
            return Err(VcError::InvalidFormat(
                "expected three dot-separated segments".to_string(),
            ))
        }
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(h)
        .map_err(|e| VcError::InvalidFormat(format!("header is not base64url: {e}")))?;
    let header: Header = serde_json::from_slice(&header_bytes)
        .map_err(|e| VcError::InvalidFormat(format!("header is not a JSON object: {e}")))?;

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(p)
        .map_err(|e| VcError::InvalidFormat(format!("payload is not base64url: {e}")))?;
    let claims: serde_json::Value = serde_json::from_slice(&claims_bytes)
        .map_err(|e| VcError::InvalidFormat(format!("payload is not JSON: {e}")))?;

    let signature = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| VcError::InvalidFormat(format!("signature is not base64url: {e}")))?;

    Ok(Parts {
        header,
        claims,
        signing_input: &token[..h.len() + 1 + p.len()],
        signature,
    })
}
