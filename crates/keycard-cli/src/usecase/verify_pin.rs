//! Standalone PIN verification over a secure session.

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use keycard_card::{Outcome, PairingSecret, Pin};

use crate::discovery::{
    AttemptOutcome, DiscoveryCommand, DiscoveryEvent, DiscoveryWorker, PendingOperation,
    RETRY_COOLDOWN,
};
use crate::usecase::UseCaseState;

pub fn run(pairing: PairingSecret, pin: Pin) -> bool {
    let mut state = UseCaseState::default();

    let (events, commands) = DiscoveryWorker::spawn();
    let generation = 1;
    let _ = commands.send(DiscoveryCommand::Arm {
        generation,
        op: PendingOperation::PinCheck { pairing, pin },
    });
    state.set_status("Tap your Keycard to verify the PIN...");

    let success = loop {
        let event = match events.recv_timeout(Duration::from_secs(1)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                state.set_status("Discovery worker stopped unexpectedly");
                break false;
            }
        };

        match event {
            DiscoveryEvent::ReaderUnavailable { error } => {
                state.set_status(format!("Card reader unavailable: {error}"));
            }
            DiscoveryEvent::ReaderAvailable => {
                state.set_status("Reader ready. Tap your Keycard...");
            }
            DiscoveryEvent::TagDiscovered { generation: g, .. } if g == generation => {
                state.log("Tag detected");
                state.set_status("Verifying PIN...");
            }
            DiscoveryEvent::AttemptFinished {
                generation: g,
                outcome,
            } if g == generation => match outcome {
                AttemptOutcome::PinCheck(Outcome::Success { .. }) => {
                    state.set_status("PIN verified.");
                    break true;
                }
                AttemptOutcome::PinCheck(Outcome::RetryableFailure { reason }) => {
                    state.log(format!("Attempt failed: {reason}"));
                    state.set_status(format!(
                        "Tag lost. Waiting {}s, then tap again...",
                        RETRY_COOLDOWN.as_secs()
                    ));
                }
                AttemptOutcome::PinCheck(Outcome::TerminalFailure { reason }) => {
                    state.set_status(format!("PIN verification failed: {reason}"));
                    break false;
                }
                other => state.log(format!("Unexpected outcome: {other:?}")),
            },
            DiscoveryEvent::TagDiscovered { .. } | DiscoveryEvent::AttemptFinished { .. } => {}
        }
    };

    let _ = commands.send(DiscoveryCommand::Stop);
    success
}
