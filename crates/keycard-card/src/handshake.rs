//! Secure session handshake
//!
//! Drives select, unpair (best-effort), pair, open-secure-channel and
//! verify-PIN as a strict sequence: each step runs only after the previous
//! one succeeded within the same attempt, and no step is skipped or
//! reordered. Pairing gets exactly one in-attempt unpair-and-retry when the
//! card reports full pairing slots or an invalid cryptogram; any other
//! pairing rejection ends the attempt.

use std::fmt;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{CardError, CardResult, Stage};
use crate::facade::CardFacade;
use crate::vendor::{status, CommandSet};

/// Pairing password shared between card and host. Held only in memory and
/// wiped on drop.
#[derive(Clone)]
pub struct PairingSecret(Zeroizing<String>);

impl PairingSecret {
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PairingSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairingSecret([REDACTED])")
    }
}

/// Card PIN. Wiped on drop, never persisted.
#[derive(Clone)]
pub struct Pin(Zeroizing<String>);

impl Pin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(Zeroizing::new(pin.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin([REDACTED])")
    }
}

/// What happened on the way to a verified session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeReport {
    /// The pre-pairing cleanup actually freed a slot.
    pub freed_pairing_slot: bool,
    /// Pairing was rejected once and succeeded after the retry unpair.
    pub pair_retried: bool,
}

/// Run the full handshake to a PIN-verified session.
pub fn run<C: CommandSet>(
    facade: &mut CardFacade<C>,
    pairing: &PairingSecret,
    pin: &Pin,
) -> CardResult<HandshakeReport> {
    let mut report = HandshakeReport::default();

    facade.select()?;
    debug!("applet selected");

    report.freed_pairing_slot = facade.unpair_best_effort();

    match facade.pair(pairing.expose()) {
        Ok(()) => debug!("paired"),
        Err(CardError::HandshakeRejected {
            stage: Stage::Pair,
            code,
        }) if code == status::PAIRING_SLOTS_FULL || code == status::INVALID_CRYPTOGRAM => {
            warn!("pairing rejected with 0x{code:04X}, unpairing and retrying once");
            facade.unpair_best_effort();
            report.pair_retried = true;
            facade.pair(pairing.expose())?;
            debug!("paired after retry");
        }
        Err(err) => return Err(err),
    }

    facade.open_secure_channel()?;
    debug!("secure channel open");

    if !facade.verify_pin(pin.expose())? {
        return Err(CardError::WrongPin);
    }
    info!("PIN verified");

    Ok(report)
}
