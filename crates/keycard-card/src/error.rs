//! Card-layer failure taxonomy.
//!
//! Every transport or vendor failure is converted into [`CardError`] at the
//! facade boundary; nothing above the facade sees a raw `pcsc` error. The
//! orchestrator is the only layer that decides retryable vs terminal.

use std::fmt;

use thiserror::Error;

/// Protocol stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Select,
    Unpair,
    Pair,
    OpenChannel,
    VerifyPin,
    Transfer,
}

impl Stage {
    /// Name of the facade operation this stage maps to.
    pub fn op_name(self) -> &'static str {
        match self {
            Stage::Select => "select",
            Stage::Unpair => "unpair",
            Stage::Pair => "pair",
            Stage::OpenChannel => "open_secure_channel",
            Stage::VerifyPin => "verify_pin",
            Stage::Transfer => "data transfer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op_name())
    }
}

/// Errors crossing the facade boundary.
#[derive(Debug, Error)]
pub enum CardError {
    /// No usable contactless capability. Fatal, surfaced once at startup.
    #[error("contactless transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Transport-level I/O failure. Always retryable up to the bound.
    #[error("tag connection lost: {0}")]
    LinkLost(String),

    /// The card answered a handshake or transfer command with an error
    /// status word.
    #[error("card rejected {stage} (SW=0x{code:04X})")]
    HandshakeRejected { stage: Stage, code: u16 },

    /// Card-reported wrong PIN. Terminal; never retried automatically, to
    /// avoid burning the card's PIN-attempt counter.
    #[error("wrong PIN")]
    WrongPin,

    #[error("payload too large: {actual} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { actual: usize, limit: usize },

    /// The credential failed validation before any card I/O.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// Bytes read back from the card did not parse.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The capability probe could not resolve a required operation.
    #[error("vendor command set does not offer {0}")]
    VendorCapabilityMissing(&'static str),
}

impl From<keycard_ndef::CodecError> for CardError {
    fn from(err: keycard_ndef::CodecError) -> Self {
        use keycard_ndef::CodecError;
        match err {
            CodecError::CredentialTooLarge { actual, limit }
            | CodecError::RecordTooLarge { actual, limit } => {
                CardError::PayloadTooLarge { actual, limit }
            }
            CodecError::Malformed(msg) => CardError::MalformedRecord(msg),
        }
    }
}

/// Result type for card operations.
pub type CardResult<T> = std::result::Result<T, CardError>;
