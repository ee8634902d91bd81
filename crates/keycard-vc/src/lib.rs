//! Credential validation and proof verification
//!
//! Structural validation (well-formed signed token, byte ceiling) runs
//! before a credential touches the card; proof verification (EdDSA over a
//! `did:key`-resolved issuer key) runs after one is read back. Decodability
//! and cryptographic trust are reported as separate facts throughout.

pub mod didkey;
pub mod error;
mod jose;
pub mod proof;
pub mod validate;

pub use error::{VcError, VcResult};
pub use proof::{verify_proof, VerificationResult, EDDSA_ALG};
pub use validate::{validate, Validation};
