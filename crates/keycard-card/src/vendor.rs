//! Vendor command-set surface
//!
//! The card-side primitives (applet selection, pairing-slot management,
//! secure channel, PIN verification, data slots) come from a vendor command
//! set. Different vendor builds expose the same operation under different
//! method shapes - `unpair()` vs `unpair_all()`, pairing with a password
//! string vs raw key bytes, `store_data(slot, ..)` vs `set_data(..)` - so
//! the trait carries one method per shape plus a [`Capabilities`] descriptor
//! saying which shapes a given binding actually offers. The facade resolves
//! one binding per operation from the descriptor, once, at construction.
//!
//! Secure-channel cryptography (key agreement, session key derivation) is
//! the vendor's concern and is not modeled here.

use thiserror::Error;

use crate::apdu::{commands, ApduResponse};
use crate::error::CardError;
use crate::transport::CardSession;

/// Data slots addressable through STORE DATA / GET DATA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSlot {
    Public = 0x00,
    Ndef = 0x01,
    Cash = 0x02,
}

impl StorageSlot {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Well-known status words.
pub mod status {
    pub const OK: u16 = 0x9000;
    /// All pairing slots are occupied.
    pub const PAIRING_SLOTS_FULL: u16 = 0x6A84;
    /// Pairing cryptogram did not verify.
    pub const INVALID_CRYPTOGRAM: u16 = 0x6982;
    /// Wrong PIN; the low nibble carries the remaining attempts.
    pub const WRONG_PIN_BASE: u16 = 0x63C0;
    /// Conditions of use not satisfied.
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
}

/// Errors surfaced by a command set.
#[derive(Debug, Error)]
pub enum CmdError {
    /// The binding does not offer this method shape.
    #[error("operation not offered by this command set")]
    Unsupported,

    /// The card answered with a non-success status word.
    #[error("card rejected command (SW=0x{0:04X})")]
    Rejected(u16),

    /// Transport-level I/O failure.
    #[error("link error: {0}")]
    Link(String),

    /// The transport itself is gone.
    #[error("transport unavailable: {0}")]
    Transport(String),
}

/// Which method shapes a command set offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub select: bool,
    pub unpair: bool,
    pub unpair_all: bool,
    pub pair_with_password: bool,
    pub pair_with_key: bool,
    pub open_secure_channel: bool,
    pub verify_pin: bool,
    pub store_data: bool,
    pub set_data: bool,
    pub get_data: bool,
    pub get_ndef: bool,
}

/// The vendor surface. A method whose capability flag is false must return
/// [`CmdError::Unsupported`]; the defaults do exactly that.
///
/// Transfer contract: `store_data`/`set_data` carry one command's worth of
/// bytes, and successive calls continue the same transfer (the applet tracks
/// the write offset). `get_data`/`get_ndef` return as many bytes as one
/// command can carry, continuing from where the previous read left off.
pub trait CommandSet {
    fn capabilities(&self) -> Capabilities;

    /// Select the applet. Precondition for everything else.
    fn select(&mut self) -> Result<(), CmdError>;

    /// Free this host's pairing slot.
    fn unpair(&mut self) -> Result<(), CmdError> {
        Err(CmdError::Unsupported)
    }

    /// Free every pairing slot.
    fn unpair_all(&mut self) -> Result<(), CmdError> {
        Err(CmdError::Unsupported)
    }

    fn pair_with_password(&mut self, _password: &str) -> Result<(), CmdError> {
        Err(CmdError::Unsupported)
    }

    fn pair_with_key(&mut self, _key: &[u8]) -> Result<(), CmdError> {
        Err(CmdError::Unsupported)
    }

    fn open_secure_channel(&mut self) -> Result<(), CmdError> {
        Err(CmdError::Unsupported)
    }

    /// `Ok(true)` = PIN accepted, `Ok(false)` = card-reported wrong PIN.
    fn verify_pin(&mut self, _pin: &str) -> Result<bool, CmdError> {
        Err(CmdError::Unsupported)
    }

    fn store_data(&mut self, _slot: StorageSlot, _chunk: &[u8]) -> Result<(), CmdError> {
        Err(CmdError::Unsupported)
    }

    fn set_data(&mut self, _chunk: &[u8]) -> Result<(), CmdError> {
        Err(CmdError::Unsupported)
    }

    fn get_data(&mut self, _slot: StorageSlot) -> Result<Vec<u8>, CmdError> {
        Err(CmdError::Unsupported)
    }

    fn get_ndef(&mut self) -> Result<Vec<u8>, CmdError> {
        Err(CmdError::Unsupported)
    }
}

/// Unauthenticated command binding over a raw PC/SC session.
///
/// Offers the plain-APDU subset: applet selection, slot reads, PIN
/// verification and slot writes on applets that accept them without a
/// secure channel. Pairing and secure-channel establishment belong to the
/// vendor SDK and are deliberately not offered, so a handshake over this
/// binding stops with a missing-capability error at the pairing step.
pub struct PlainCommandSet {
    session: CardSession,
    read_done: bool,
}

impl PlainCommandSet {
    pub fn new(session: CardSession) -> Self {
        Self {
            session,
            read_done: false,
        }
    }

    /// Close the underlying session.
    pub fn close(&mut self) {
        self.session.close();
    }

    fn exchange(&mut self, apdu: &[u8]) -> Result<ApduResponse, CmdError> {
        let response = self.session.transmit(apdu).map_err(|err| match err {
            CardError::LinkLost(detail) => CmdError::Link(detail),
            CardError::TransportUnavailable(detail) => CmdError::Transport(detail),
            other => CmdError::Link(other.to_string()),
        })?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(CmdError::Rejected(response.status_word()))
        }
    }
}

impl CommandSet for PlainCommandSet {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            select: true,
            verify_pin: true,
            store_data: true,
            get_data: true,
            ..Capabilities::default()
        }
    }

    fn select(&mut self) -> Result<(), CmdError> {
        self.exchange(&commands::select(commands::KEYCARD_AID).build())?;
        Ok(())
    }

    fn verify_pin(&mut self, pin: &str) -> Result<bool, CmdError> {
        match self.exchange(&commands::verify_pin(pin).build()) {
            Ok(_) => Ok(true),
            Err(CmdError::Rejected(sw)) if sw & 0xFFF0 == status::WRONG_PIN_BASE => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn store_data(&mut self, slot: StorageSlot, chunk: &[u8]) -> Result<(), CmdError> {
        self.exchange(&commands::store_data(slot.id(), chunk).build())?;
        Ok(())
    }

    fn get_data(&mut self, slot: StorageSlot) -> Result<Vec<u8>, CmdError> {
        // The applet returns the whole slot in one response; report an empty
        // continuation so the facade's reassembly loop terminates.
        if self.read_done {
            return Ok(Vec::new());
        }
        let response = self.exchange(&commands::get_data(slot.id()).build())?;
        self.read_done = true;
        Ok(response.data)
    }
}
