//! Read-credential use case: read the data slot, decode the stored record,
//! and verify the credential's cryptographic proof.
//!
//! Reads are public by default; `--pin-gated` runs the full handshake first
//! for deployments that require a verified session even for reads.

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use keycard_card::{PairingSecret, Pin, ReadOperation, ReadOutcome};
use keycard_ndef::{extract_credential, Record};

use crate::discovery::{
    AttemptOutcome, DiscoveryCommand, DiscoveryEvent, DiscoveryWorker, PendingOperation,
    RETRY_COOLDOWN,
};
use crate::usecase::UseCaseState;

pub fn run(gate: Option<(PairingSecret, Pin)>) -> bool {
    let mut state = UseCaseState::default();

    let op = match gate {
        Some((pairing, pin)) => ReadOperation::pin_gated(pairing, pin),
        None => ReadOperation::public(),
    };

    let (events, commands) = DiscoveryWorker::spawn();
    let generation = 1;
    let _ = commands.send(DiscoveryCommand::Arm {
        generation,
        op: PendingOperation::Read(op),
    });
    state.set_status("Tap your Keycard to read...");

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
                state.set_status("Reading, please don't move the card...");
            }
            DiscoveryEvent::AttemptFinished {
                generation: g,
                outcome,
            } if g == generation => match outcome {
                AttemptOutcome::Read(ReadOutcome::Success { frame_hex, records }) => {
                    state.log(format!("Read frame: {frame_hex}"));
                    break report(&mut state, &records);
                }
                AttemptOutcome::Read(ReadOutcome::RetryableFailure { reason }) => {
                    state.log(format!("Attempt failed: {reason}"));
                    state.set_status(format!(
                        "Tag lost. Waiting {}s, then tap again...",
                        RETRY_COOLDOWN.as_secs()
                    ));
                }
                AttemptOutcome::Read(ReadOutcome::TerminalFailure { reason }) => {
                    state.set_status(format!("Read failed: {reason}"));
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

/// Render what was read. A stored credential goes through proof
/// verification; other records are shown as they are.
fn report(state: &mut UseCaseState, records: &[Record]) -> bool {
    if let Some(token) = extract_credential(records) {
        state.log(format!("Credential read ({} bytes)", token.len()));
        state.set_status("Credential read. Verifying cryptographic proof...");

        let result = keycard_vc::verify_proof(&token);
        if !result.valid {
            let reason = result
                .error
                .unwrap_or_else(|| "credential did not decode".to_string());
            state.set_status(format!("Proof verification failed: {reason}"));
            return false;
        }

        println!("issuer:   {}", result.issuer.as_deref().unwrap_or("<none>"));
        println!("subject:  {}", result.subject.as_deref().unwrap_or("<none>"));
        println!(
            "verified: {}",
            if result.signature_verified {
                "yes"
            } else {
                "no (decoded without cryptographic proof)"
            }
        );
        if let Some(claims) = &result.vc_claims {
            println!(
                "claims:   {}",
                serde_json::to_string_pretty(claims).unwrap_or_else(|_| claims.to_string())
            );
        }
        state.set_status(if result.signature_verified {
            "Credential verified and decoded."
        } else {
            "Credential decoded; signature not verified."
        });
        return true;
    }

    for record in records {
        match record {
            Record::Uri(url) => println!("uri: {url}"),
            Record::Text { lang, text } => println!("text ({lang}): {text}"),
            Record::Mime { mime_type, payload } => {
                println!("mime {mime_type}: {} bytes", payload.len())
            }
            Record::Other {
                tnf,
                record_type,
                payload,
            } => println!(
                "record (tnf {tnf}, type {:?}): {} bytes",
                record_type,
                payload.len()
            ),
        }
    }
    state.set_status("No credential record found on the card.");
    true
}
