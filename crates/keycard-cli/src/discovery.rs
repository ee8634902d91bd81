//! Background discovery worker
//!
//! Owns the polling loop over the PC/SC reader: the process-wide, single-
//! owner discovery mechanism. A use-case controller arms the worker with one
//! pending operation; each physical tap runs one attempt of that operation
//! on this thread and the outcome is relayed back over the event channel.
//! Arming a new operation replaces the previous registration, and results
//! carrying a stale generation are discarded by the controller, so a
//! cancelled operation can finish its in-flight attempt harmlessly.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use keycard_card::{
    perform_pin_check, perform_read, perform_write, CardReader, CardSession, Outcome,
    PairingSecret, Pin, PlainCommandSet, ReadOperation, ReadOutcome, WriteOperation,
};

/// Wait between attempts after a retryable failure.
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const READER_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// One pending operation, armed by a use-case controller.
pub enum PendingOperation {
    Write(WriteOperation),
    Read(ReadOperation),
    PinCheck { pairing: PairingSecret, pin: Pin },
}

/// Result of one attempt, relayed to the controller.
#[derive(Debug)]
pub enum AttemptOutcome {
    Write(Outcome),
    Read(ReadOutcome),
    PinCheck(Outcome),
}

impl AttemptOutcome {
    fn keep_polling(&self) -> bool {
        match self {
            AttemptOutcome::Write(outcome) | AttemptOutcome::PinCheck(outcome) => {
                outcome.keep_polling()
            }
            AttemptOutcome::Read(outcome) => outcome.keep_polling(),
        }
    }
}

/// Messages sent from the discovery worker to the controller.
#[derive(Debug)]
pub enum DiscoveryEvent {
    /// Reader context established.
    ReaderAvailable,
    /// No reader context; polling continues.
    ReaderUnavailable { error: String },
    /// A tap was consumed for the armed operation.
    TagDiscovered { generation: u64, reader_name: String },
    /// One attempt ran to completion.
    AttemptFinished {
        generation: u64,
        outcome: AttemptOutcome,
    },
}

/// Commands sent from the controller to the worker.
pub enum DiscoveryCommand {
    /// Register the single consumer. Any previously armed operation is
    /// replaced.
    Arm {
        generation: u64,
        op: PendingOperation,
    },
    /// Drop the pending operation and stop consuming taps.
    Disarm,
    /// Stop the worker thread.
    Stop,
}

/// Background worker for card discovery and attempts
pub struct DiscoveryWorker {
    event_tx: Sender<DiscoveryEvent>,
    command_rx: Receiver<DiscoveryCommand>,
}

impl DiscoveryWorker {
    /// Spawn the worker thread.
    pub fn spawn() -> (Receiver<DiscoveryEvent>, Sender<DiscoveryCommand>) {
        let (event_tx, event_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();

        thread::spawn(move || {
            let worker = DiscoveryWorker {
                event_tx,
                command_rx,
            };
            worker.run();
        });

        (event_rx, command_tx)
    }

    fn run(self) {
        info!("discovery worker started");

        let mut reader: Option<CardReader> = None;
        let mut armed: Option<(u64, PendingOperation)> = None;
        let mut card_present = false;
        let mut last_reader_check: Option<Instant> = None;
        let mut next_attempt_at = Instant::now();

        loop {
            // Drain commands (non-blocking).
            loop {
                match self.command_rx.try_recv() {
                    Ok(DiscoveryCommand::Arm { generation, op }) => {
                        if armed.is_some() {
                            debug!("replacing previously armed operation");
                        }
                        armed = Some((generation, op));
                        next_attempt_at = Instant::now();
                    }
                    Ok(DiscoveryCommand::Disarm) => {
                        armed = None;
                    }
                    Ok(DiscoveryCommand::Stop) => {
                        info!("discovery worker stopping");
                        return;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        info!("controller gone, discovery worker stopping");
                        return;
                    }
                }
            }

            // (Re)establish the reader context every couple of seconds.
            if reader.is_none()
                && last_reader_check.map_or(true, |t| t.elapsed() >= READER_RETRY_INTERVAL)
            {
                match CardReader::new() {
                    Ok(r) => {
                        info!("card reader initialized");
                        reader = Some(r);
                        let _ = self.event_tx.send(DiscoveryEvent::ReaderAvailable);
                    }
                    Err(err) => {
                        debug!(error = %err, "card reader unavailable");
                        let _ = self.event_tx.send(DiscoveryEvent::ReaderUnavailable {
                            error: err.to_string(),
                        });
                    }
                }
                last_reader_check = Some(Instant::now());
            }

            if let Some(r) = reader.as_ref() {
                if armed.is_some() && Instant::now() >= next_attempt_at {
                    match r.connect_first() {
                        Ok((session, reader_name)) => {
                            // One attempt per physical tap: the card must
                            // leave the field before the next one counts.
                            if !card_present {
                                card_present = true;
                                if let Some((generation, mut op)) = armed.take() {
                                    info!(reader = %reader_name, "tag discovered");
                                    let _ = self.event_tx.send(DiscoveryEvent::TagDiscovered {
                                        generation,
                                        reader_name,
                                    });

                                    let outcome = run_attempt(session, &mut op);
                                    let keep = outcome.keep_polling();
                                    let _ = self.event_tx.send(DiscoveryEvent::AttemptFinished {
                                        generation,
                                        outcome,
                                    });
                                    if keep {
                                        next_attempt_at = Instant::now() + RETRY_COOLDOWN;
                                        armed = Some((generation, op));
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            if card_present {
                                debug!("tag left the field");
                                card_present = false;
                            } else {
                                debug!(error = %err, "no tag in field");
                            }
                        }
                    }
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Run one attempt over a fresh session. The session is consumed; retries
/// wait for a new tap.
fn run_attempt(session: CardSession, op: &mut PendingOperation) -> AttemptOutcome {
    let cmd = PlainCommandSet::new(session);
    match op {
        PendingOperation::Write(op) => AttemptOutcome::Write(perform_write(cmd, op)),
        PendingOperation::Read(op) => AttemptOutcome::Read(perform_read(cmd, op)),
        PendingOperation::PinCheck { pairing, pin } => {
            AttemptOutcome::PinCheck(perform_pin_check(cmd, pairing, pin))
        }
    }
}
