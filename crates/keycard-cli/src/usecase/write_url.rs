//! Write-URL use case: encode a URI record and store it behind the
//! PIN-verified handshake.

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use keycard_card::{Outcome, PairingSecret, Pin, WriteOperation, MAX_ATTEMPTS};
use keycard_ndef::{encode_uri, Limits};

use crate::discovery::{
    AttemptOutcome, DiscoveryCommand, DiscoveryEvent, DiscoveryWorker, PendingOperation,
    RETRY_COOLDOWN,
};
use crate::usecase::{extract_error_code, UseCaseState};

pub fn run(url: &str, pairing: PairingSecret, pin: Pin, limits: &Limits) -> bool {
    let mut state = UseCaseState::default();

    // Size violations are reported before any tap is requested.
    let frame = match encode_uri(url, limits) {
        Ok(frame) => frame,
        Err(err) => {
            state.set_status(format!("Cannot write URL: {err}"));
            return false;
        }
    };
    state.log(format!(
        "Encoded URI record for {url} ({} bytes framed)",
        frame.len()
    ));

    let (events, commands) = DiscoveryWorker::spawn();
    let generation = 1;
    let op = WriteOperation::new(frame, pairing, pin);
    let _ = commands.send(DiscoveryCommand::Arm {
        generation,
        op: PendingOperation::Write(op),
    });
    state.set_status("Tap your Keycard to write the URL...");

    let mut attempts = 0u32;
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
                attempts += 1;
                state.log(format!("Tag detected (attempt {attempts}/{MAX_ATTEMPTS})"));
                state.set_status("Connection established, please don't move the card...");
            }
            DiscoveryEvent::AttemptFinished {
                generation: g,
                outcome,
            } if g == generation => match outcome {
                AttemptOutcome::Write(Outcome::Success { confirmation_hex }) => {
                    state.log(format!("Stored frame: {confirmation_hex}"));
                    state.set_status("URL written.");
                    println!("{confirmation_hex}");
                    break true;
                }
                AttemptOutcome::Write(Outcome::RetryableFailure { reason }) => {
                    state.log(format!("Attempt failed: {reason}"));
                    state.set_status(format!(
                        "Tag lost. Waiting {}s, then tap again ({attempts}/{MAX_ATTEMPTS})...",
                        RETRY_COOLDOWN.as_secs()
                    ));
                }
                AttemptOutcome::Write(Outcome::TerminalFailure { reason }) => {
                    let code = extract_error_code(&reason)
                        .map(|c| format!(" [{c}]"))
                        .unwrap_or_default();
                    state.set_status(format!("Failed to write URL: {reason}{code}"));
                    break false;
                }
                other => state.log(format!("Unexpected outcome: {other:?}")),
            },
            // Stale generation: result of a dismissed operation, discard.
            DiscoveryEvent::TagDiscovered { .. } | DiscoveryEvent::AttemptFinished { .. } => {}
        }
    };

    let _ = commands.send(DiscoveryCommand::Stop);
    success
}
