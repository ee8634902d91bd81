//! Write/read orchestration and the retry policy
//!
//! One physical tap is one attempt. The orchestrator runs the handshake and
//! payload transfer for that attempt over a freshly tapped command set,
//! classifies any failure as retryable link loss or terminal, and tells the
//! caller through the outcome whether to keep the discovery mechanism
//! polling for another tap. This is the only layer allowed to make the
//! retry-vs-terminal decision.

use tracing::{info, warn};

use keycard_ndef::{self as ndef, Record};

use crate::error::{CardError, CardResult};
use crate::facade::CardFacade;
use crate::handshake::{self, PairingSecret, Pin};
use crate::vendor::{CommandSet, StorageSlot};

/// Attempts allowed per logical operation, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

/// Retry bookkeeping for one logical operation.
///
/// `attempt` never exceeds `max_attempts`; once the budget is spent, the
/// operation only produces terminal failures and no further card I/O runs.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    last_error: Option<String>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_error: None,
        }
    }

    /// Attempts performed so far; resets to zero after a success.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    fn begin(&mut self) {
        self.attempt += 1;
    }

    fn succeed(&mut self) {
        self.attempt = 0;
        self.last_error = None;
    }
}

/// Terminal states of one write (or PIN-check) attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload stored; hex of the framed bytes that went to the card.
    Success { confirmation_hex: String },
    /// The link dropped and the retry budget allows another tap.
    RetryableFailure { reason: String },
    /// The operation is over; stop polling.
    TerminalFailure { reason: String },
}

impl Outcome {
    /// Whether the discovery mechanism should stay armed for another tap.
    pub fn keep_polling(&self) -> bool {
        matches!(self, Outcome::RetryableFailure { .. })
    }
}

/// Terminal states of one read attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Success {
        frame_hex: String,
        records: Vec<Record>,
    },
    RetryableFailure {
        reason: String,
    },
    TerminalFailure {
        reason: String,
    },
}

impl ReadOutcome {
    pub fn keep_polling(&self) -> bool {
        matches!(self, ReadOutcome::RetryableFailure { .. })
    }
}

/// Whether reads run behind the PIN-verified handshake. Data-slot reads are
/// public by default; the gated policy exists for deployments that require
/// a verified session even for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    #[default]
    Public,
    PinGated,
}

/// One logical user-intent write, spanning up to [`MAX_ATTEMPTS`] taps.
///
/// The framed payload and the credential values carry across attempts; live
/// session state never does - every attempt taps a fresh session.
#[derive(Debug)]
pub struct WriteOperation {
    frame: Vec<u8>,
    slot: StorageSlot,
    pairing: PairingSecret,
    pin: Pin,
    retry: RetryState,
}

impl WriteOperation {
    /// `frame` is the codec's framed output; the size ceilings were already
    /// enforced when it was encoded.
    pub fn new(frame: Vec<u8>, pairing: PairingSecret, pin: Pin) -> Self {
        Self {
            frame,
            slot: StorageSlot::Ndef,
            pairing,
            pin,
            retry: RetryState::new(MAX_ATTEMPTS),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.retry.attempt()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.retry.last_error()
    }
}

/// One logical read, spanning up to [`MAX_ATTEMPTS`] taps.
#[derive(Debug)]
pub struct ReadOperation {
    policy: ReadPolicy,
    slot: StorageSlot,
    credentials: Option<(PairingSecret, Pin)>,
    retry: RetryState,
}

impl ReadOperation {
    /// Public read: select the applet and read the slot, no PIN.
    pub fn public() -> Self {
        Self {
            policy: ReadPolicy::Public,
            slot: StorageSlot::Ndef,
            credentials: None,
            retry: RetryState::new(MAX_ATTEMPTS),
        }
    }

    /// Gated read: full handshake (including PIN) before the read.
    pub fn pin_gated(pairing: PairingSecret, pin: Pin) -> Self {
        Self {
            policy: ReadPolicy::PinGated,
            slot: StorageSlot::Ndef,
            credentials: Some((pairing, pin)),
            retry: RetryState::new(MAX_ATTEMPTS),
        }
    }

    pub fn policy(&self) -> ReadPolicy {
        self.policy
    }

    pub fn attempt(&self) -> u32 {
        self.retry.attempt()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.retry.last_error()
    }
}

/// Run one write attempt over a freshly tapped command set.
///
/// The command set is consumed: sessions are never reused across attempts.
pub fn perform_write<C: CommandSet>(cmd: C, op: &mut WriteOperation) -> Outcome {
    if op.retry.exhausted() {
        return Outcome::TerminalFailure {
            reason: budget_reason(&op.retry),
        };
    }
    op.retry.begin();
    info!(
        attempt = op.retry.attempt(),
        max = op.retry.max_attempts(),
        bytes = op.frame.len(),
        "write attempt started"
    );

    let mut facade = CardFacade::new(cmd);
    match write_attempt(&mut facade, op) {
        Ok(()) => {
            // Free the pairing slot we consumed; failure is irrelevant here.
            facade.unpair_best_effort();
            op.retry.succeed();
            let confirmation_hex = hex::encode(&op.frame);
            info!(hex = %confirmation_hex, "payload stored");
            Outcome::Success { confirmation_hex }
        }
        Err(err) => match classify(&mut op.retry, err) {
            Disposition::Retry(reason) => Outcome::RetryableFailure { reason },
            Disposition::Terminal(reason) => Outcome::TerminalFailure { reason },
        },
    }
}

fn write_attempt<C: CommandSet>(
    facade: &mut CardFacade<C>,
    op: &WriteOperation,
) -> CardResult<()> {
    handshake::run(facade, &op.pairing, &op.pin)?;
    facade.write_payload(op.slot, &op.frame)
}

/// Run one read attempt over a freshly tapped command set.
pub fn perform_read<C: CommandSet>(cmd: C, op: &mut ReadOperation) -> ReadOutcome {
    if op.retry.exhausted() {
        return ReadOutcome::TerminalFailure {
            reason: budget_reason(&op.retry),
        };
    }
    op.retry.begin();
    info!(
        attempt = op.retry.attempt(),
        max = op.retry.max_attempts(),
        policy = ?op.policy,
        "read attempt started"
    );

    let mut facade = CardFacade::new(cmd);
    let frame = match read_attempt(&mut facade, op) {
        Ok(frame) => frame,
        Err(err) => {
            return match classify(&mut op.retry, err) {
                Disposition::Retry(reason) => ReadOutcome::RetryableFailure { reason },
                Disposition::Terminal(reason) => ReadOutcome::TerminalFailure { reason },
            }
        }
    };

    // A payload that reached us intact but does not parse is not going to
    // parse on a second tap either.
    match ndef::decode_records(&frame) {
        Ok(records) => {
            if op.credentials.is_some() {
                facade.unpair_best_effort();
            }
            op.retry.succeed();
            ReadOutcome::Success {
                frame_hex: hex::encode(&frame),
                records,
            }
        }
        Err(err) => {
            let reason = CardError::from(err).to_string();
            warn!(reason = %reason, "stored payload did not decode");
            op.retry.last_error = Some(reason.clone());
            ReadOutcome::TerminalFailure { reason }
        }
    }
}

fn read_attempt<C: CommandSet>(
    facade: &mut CardFacade<C>,
    op: &ReadOperation,
) -> CardResult<Vec<u8>> {
    match &op.credentials {
        Some((pairing, pin)) => {
            handshake::run(facade, pairing, pin)?;
        }
        None => facade.select()?,
    }
    facade.read_payload(op.slot)
}

/// Standalone PIN check: full handshake, no payload transfer. Retry pacing
/// is left to the caller, so the outcome only carries the classification.
pub fn perform_pin_check<C: CommandSet>(
    cmd: C,
    pairing: &PairingSecret,
    pin: &Pin,
) -> Outcome {
    let mut facade = CardFacade::new(cmd);
    match handshake::run(&mut facade, pairing, pin) {
        Ok(_) => {
            facade.unpair_best_effort();
            Outcome::Success {
                confirmation_hex: String::new(),
            }
        }
        Err(err) => {
            let reason = err.to_string();
            if !matches!(err, CardError::WrongPin) && is_retryable(&err) {
                Outcome::RetryableFailure { reason }
            } else {
                Outcome::TerminalFailure { reason }
            }
        }
    }
}

enum Disposition {
    Retry(String),
    Terminal(String),
}

fn classify(retry: &mut RetryState, err: CardError) -> Disposition {
    let reason = err.to_string();
    retry.last_error = Some(reason.clone());

    if matches!(err, CardError::WrongPin) {
        warn!("wrong PIN, not retrying");
        return Disposition::Terminal(reason);
    }
    if is_retryable(&err) {
        if retry.exhausted() {
            warn!(attempts = retry.attempt(), "retry budget exhausted");
            return Disposition::Terminal(format!(
                "failed after {} attempts: {reason}",
                retry.attempt()
            ));
        }
        warn!(attempt = retry.attempt(), reason = %reason, "link lost, keep polling");
        return Disposition::Retry(reason);
    }
    warn!(reason = %reason, "terminal failure");
    Disposition::Terminal(reason)
}

fn budget_reason(retry: &RetryState) -> String {
    match retry.last_error() {
        Some(last) => format!(
            "retry budget exhausted after {} attempts: {last}",
            retry.attempt()
        ),
        None => format!("retry budget exhausted after {} attempts", retry.attempt()),
    }
}

/// Link loss in any costume: the typed transport failure, a timeout, or a
/// connection phrase buried in a rendered vendor message.
pub fn is_retryable(err: &CardError) -> bool {
    match err {
        CardError::LinkLost(_) => true,
        CardError::WrongPin => false,
        other => {
            let msg = other.to_string().to_lowercase();
            msg.contains("tag was lost")
                || msg.contains("tag lost")
                || msg.contains("timeout")
                || msg.contains("connection")
                || msg.contains("secure channel lost")
                || msg.contains("session may have been lost")
        }
    }
}
