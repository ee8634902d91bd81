//! Keycard link - secure session protocol engine
//!
//! This crate drives authenticated, encrypted sessions with a Keycard over
//! a contactless link: applet selection, pairing-slot management, secure
//! channel establishment, PIN verification, and chunked reads/writes of the
//! card's data slot, with a bounded retry policy for the link loss that is
//! routine with tap-based cards.

pub mod apdu;
pub mod error;
pub mod facade;
pub mod handshake;
pub mod operation;
pub mod transport;
pub mod vendor;

pub use error::{CardError, CardResult, Stage};
pub use facade::{CardFacade, ResolvedOps, MAX_CHUNK_BYTES};
pub use handshake::{HandshakeReport, PairingSecret, Pin};
pub use operation::{
    perform_pin_check, perform_read, perform_write, Outcome, ReadOperation, ReadOutcome,
    ReadPolicy, RetryState, WriteOperation, MAX_ATTEMPTS,
};
pub use transport::{CardReader, CardSession, DEFAULT_SESSION_TIMEOUT};
pub use vendor::{Capabilities, CmdError, CommandSet, PlainCommandSet, StorageSlot};
