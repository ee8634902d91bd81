//! Structural credential validation.
//!
//! Runs before any card I/O: the token must be a well-formed signed token
//! and fit the configured byte ceiling. The size check runs even when the
//! token does not parse, so the reported size is always exact.

use crate::jose;

/// Outcome of structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub error: Option<String>,
    pub size_bytes: usize,
}

/// Validate a credential token against structure and the byte ceiling.
pub fn validate(token: &str, max_bytes: usize) -> Validation {
    let token = token.trim();
    let size_bytes = token.len();

    if size_bytes > max_bytes {
        return Validation {
            valid: false,
            error: Some(format!(
                "credential too large: {size_bytes} bytes exceeds the {max_bytes}-byte limit"
            )),
            size_bytes,
        };
    }

    match jose::parse(token) {
        Ok(_) => Validation {
            valid: true,
            error: None,
            size_bytes,
        },
        Err(err) => Validation {
            valid: false,
            error: Some(err.to_string()),
            size_bytes,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "eyJhbGciOiJFZERTQSJ9.eyJpc3MiOiJ4In0.c2ln";

    #[test]
    fn test_well_formed_token_passes() {
        let result = validate(SAMPLE, 1000);
        assert!(result.valid);
        assert_eq!(result.error, None);
        assert_eq!(result.size_bytes, SAMPLE.len());
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let padded = format!("  {SAMPLE}\n");
        let result = validate(&padded, 1000);
        assert!(result.valid);
        assert_eq!(result.size_bytes, SAMPLE.len());
    }

    #[test]
    fn test_oversized_token_reports_exact_size() {
        let token = "a".repeat(1200);
        let result = validate(&token, 1000);
        assert!(!result.valid);
        assert_eq!(result.size_bytes, 1200);
        let message = result.error.unwrap();
        assert!(message.contains("1200"));
        assert!(message.contains("1000"));
    }

    #[test]
    fn test_garbage_fails_structurally() {
        let result = validate("not a signed token", 1000);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("invalid credential format"));
    }
}
